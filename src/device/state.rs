use crate::device::offsets::{
    STATUS_ARRIVE_LEAVING, STATUS_LOADING_MASK, STATUS_LOADING_SIGNATURES, STATUS_OVERWORLD,
};

/// Coarse classification of the session derived from the status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverworldState {
    Null,
    Overworld,
    Loading,
    UserArriveLeaving,
    Unknown,
}

/// Maps a raw status word to a state. Pure: recomputed on every poll, no
/// identity is kept between reads.
pub fn classify_state(status: u32) -> OverworldState {
    if status == 0 {
        return OverworldState::Null;
    }
    if status == STATUS_OVERWORLD {
        return OverworldState::Overworld;
    }
    if status == STATUS_ARRIVE_LEAVING {
        return OverworldState::UserArriveLeaving;
    }
    let low = status & STATUS_LOADING_MASK;
    if STATUS_LOADING_SIGNATURES.contains(&low) {
        return OverworldState::Loading;
    }
    OverworldState::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_sentinels_classify() {
        assert_eq!(classify_state(0), OverworldState::Null);
        assert_eq!(classify_state(STATUS_OVERWORLD), OverworldState::Overworld);
        assert_eq!(
            classify_state(STATUS_ARRIVE_LEAVING),
            OverworldState::UserArriveLeaving
        );
    }

    #[test]
    fn loading_matches_low_sixteen_bits_only() {
        for signature in STATUS_LOADING_SIGNATURES {
            assert_eq!(classify_state(signature), OverworldState::Loading);
            assert_eq!(
                classify_state(0xDEAD_0000 | signature),
                OverworldState::Loading
            );
        }
    }

    #[test]
    fn unmatched_words_are_unknown() {
        assert_eq!(classify_state(0x1234_5678), OverworldState::Unknown);
        assert_eq!(classify_state(0xFFFF_FFFF), OverworldState::Unknown);
    }

    #[test]
    fn classification_is_pure_and_exclusive() {
        let samples = [
            0u32,
            1,
            STATUS_OVERWORLD,
            STATUS_ARRIVE_LEAVING,
            STATUS_LOADING_SIGNATURES[0],
            0xAAAA_0000 | STATUS_LOADING_SIGNATURES[1],
            0x7777_7777,
            u32::MAX,
        ];
        for status in samples {
            let first = classify_state(status);
            let second = classify_state(status);
            assert_eq!(first, second);
            // Exactly one case claims each input.
            let claims = [
                status == 0,
                status == STATUS_OVERWORLD,
                status == STATUS_ARRIVE_LEAVING,
                status != 0
                    && status != STATUS_OVERWORLD
                    && status != STATUS_ARRIVE_LEAVING
                    && STATUS_LOADING_SIGNATURES.contains(&(status & STATUS_LOADING_MASK)),
            ];
            let claimed = claims.iter().filter(|hit| **hit).count();
            assert!(claimed <= 1);
            if claimed == 0 {
                assert_eq!(first, OverworldState::Unknown);
            }
        }
    }
}
