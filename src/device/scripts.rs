//! UI traversal scripts expressed as data. Each script is a flat list of
//! steps with explicit delays; the executor is the only place that touches
//! the transport, so the sequences themselves stay testable as plain values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::device::offsets::{TEXT_SPEED_ADDRESS, TEXT_SPEED_FROZEN};
use crate::net::commands::{Button, Stick};
use crate::net::transport::DeviceLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Press and release, then wait the given milliseconds.
    Click(Button, u64),
    Hold(Button),
    Release(Button),
    /// Set an analog stick vector, then wait.
    StickSet(Stick, i16, i16, u64),
    StickNeutral(Stick),
    Wait(u64),
    FreezeText,
    UnfreezeText,
}

/// Delay knobs for scripted traversal, all in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptDelays {
    pub dialogue_ms: u64,
    pub navigate_ms: u64,
    pub load_ms: u64,
    pub relaunch_ms: u64,
}

impl Default for ScriptDelays {
    fn default() -> Self {
        Self {
            dialogue_ms: 1_200,
            navigate_ms: 500,
            load_ms: 6_000,
            relaunch_ms: 20_000,
        }
    }
}

/// Which dodo acquisition dialogue traversal to use. All three end in the
/// same state: code issued and readable, dialogue fully dismissed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DodoScriptKind {
    #[default]
    Standard,
    Legacy,
    FrozenText,
}

/// Standard path: invite anyone, online play, confirm through every prompt.
pub fn dodo_script(kind: DodoScriptKind, delays: &ScriptDelays) -> Vec<Step> {
    let d = delays.dialogue_ms;
    match kind {
        DodoScriptKind::Standard => vec![
            Step::Click(Button::A, d),
            Step::Click(Button::A, d),
            Step::Click(Button::DDown, delays.navigate_ms),
            Step::Click(Button::A, d),
            Step::Click(Button::DDown, delays.navigate_ms),
            Step::Click(Button::A, d),
            Step::Click(Button::A, d),
            Step::Click(Button::A, d),
            Step::Click(Button::A, delays.load_ms),
            Step::Click(Button::A, d),
            Step::Click(Button::A, d),
            Step::Click(Button::B, d),
            Step::Click(Button::B, d),
        ],
        DodoScriptKind::Legacy => vec![
            Step::Click(Button::A, d),
            Step::Click(Button::A, d),
            Step::Click(Button::A, d),
            Step::Click(Button::DDown, delays.navigate_ms),
            Step::Click(Button::DDown, delays.navigate_ms),
            Step::Click(Button::A, d),
            Step::Click(Button::A, d),
            Step::Click(Button::A, d),
            Step::Click(Button::A, delays.load_ms),
            Step::Click(Button::A, d),
            Step::Click(Button::B, d),
            Step::Click(Button::B, d),
            Step::Click(Button::B, d),
        ],
        DodoScriptKind::FrozenText => vec![
            Step::FreezeText,
            Step::Click(Button::A, d / 2),
            Step::Click(Button::A, d / 2),
            Step::Click(Button::DDown, delays.navigate_ms),
            Step::Click(Button::A, d / 2),
            Step::Click(Button::DDown, delays.navigate_ms),
            Step::Click(Button::A, d / 2),
            Step::Click(Button::A, d / 2),
            Step::Click(Button::A, d / 2),
            Step::Click(Button::A, delays.load_ms),
            Step::Click(Button::A, d / 2),
            Step::UnfreezeText,
            Step::Click(Button::B, d),
            Step::Click(Button::B, d),
        ],
    }
}

/// From console relaunch through the title screen into the loading game.
pub fn title_screen_script(delays: &ScriptDelays) -> Vec<Step> {
    vec![
        Step::Click(Button::A, delays.dialogue_ms),
        Step::Click(Button::A, delays.dialogue_ms),
        Step::Click(Button::A, delays.load_ms),
    ]
}

/// Close the running game from the home menu and start it again.
pub fn relaunch_script(delays: &ScriptDelays) -> Vec<Step> {
    vec![
        Step::Click(Button::Home, delays.dialogue_ms),
        Step::Click(Button::X, delays.dialogue_ms),
        Step::Click(Button::A, delays.load_ms),
        Step::Click(Button::A, delays.dialogue_ms),
        Step::Click(Button::A, delays.relaunch_ms),
    ]
}

/// One forward walk attempt through the airport door.
pub fn airport_enter_script(delays: &ScriptDelays) -> Vec<Step> {
    vec![
        Step::StickSet(Stick::Left, 0, 0x7FFF, delays.navigate_ms),
        Step::StickNeutral(Stick::Left),
        Step::Wait(delays.navigate_ms),
    ]
}

/// Walk out of the airport after the code is issued.
pub fn airport_leave_script(delays: &ScriptDelays) -> Vec<Step> {
    vec![
        Step::Click(Button::B, delays.dialogue_ms),
        Step::StickSet(Stick::Left, 0, -0x7FFF, delays.navigate_ms * 2),
        Step::StickNeutral(Stick::Left),
        Step::Wait(delays.load_ms),
    ]
}

/// Gate closing dialogue with the counter attendant.
pub fn close_gate_script(delays: &ScriptDelays) -> Vec<Step> {
    let d = delays.dialogue_ms;
    vec![
        Step::Click(Button::A, d),
        Step::Click(Button::A, d),
        Step::Click(Button::DDown, delays.navigate_ms),
        Step::Click(Button::DDown, delays.navigate_ms),
        Step::Click(Button::A, d),
        Step::Click(Button::A, delays.load_ms),
        Step::Click(Button::B, d),
        Step::Click(Button::B, d),
    ]
}

/// Drop one pocket item at the current position via the inventory menu.
pub fn drop_item_script(delays: &ScriptDelays) -> Vec<Step> {
    let d = delays.navigate_ms;
    vec![
        Step::Click(Button::X, delays.dialogue_ms),
        Step::Click(Button::A, d),
        Step::Click(Button::DDown, d),
        Step::Click(Button::A, d),
        Step::Click(Button::A, d),
        Step::Click(Button::B, delays.dialogue_ms),
    ]
}

pub fn run_steps(link: &mut DeviceLink, steps: &[Step]) -> Result<(), String> {
    for step in steps {
        match *step {
            Step::Click(button, wait_ms) => {
                link.click(button)?;
                sleep_ms(wait_ms);
            }
            Step::Hold(button) => link.press(button)?,
            Step::Release(button) => link.release(button)?,
            Step::StickSet(stick, x, y, wait_ms) => {
                link.set_stick(stick, x, y)?;
                sleep_ms(wait_ms);
            }
            Step::StickNeutral(stick) => link.set_stick(stick, 0, 0)?,
            Step::Wait(wait_ms) => sleep_ms(wait_ms),
            Step::FreezeText => link.freeze(TEXT_SPEED_ADDRESS, &[TEXT_SPEED_FROZEN])?,
            Step::UnfreezeText => link.unfreeze(TEXT_SPEED_ADDRESS)?,
        }
    }
    Ok(())
}

fn sleep_ms(ms: u64) {
    if ms > 0 {
        std::thread::sleep(Duration::from_millis(ms));
    }
}
