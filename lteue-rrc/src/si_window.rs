//! SI scheduling arithmetic (3GPP TS 36.331 Sec 5.2.3)
//!
//! Pure functions mapping a SIB index, the current TTI and the SIB1
//! scheduling information onto the next SI-window. SIB indices are 0-based
//! throughout the crate: index 0 is SIB1, index 1 is SIB2, and so on.

use crate::messages::Sib1;
use crate::tti::Tti;

/// Fixed SIB1 repetition period in frames (every other frame, subframe 5,
/// with a new revision every 20 ms).
pub const SIB1_PERIODICITY_FRAMES: u32 = 20;

/// Compute the si-Periodicity "T" (in frames) and the schedulingInfoList
/// entry index "n" for the given SIB.
///
/// Returns `None` when the SIB is not scheduled in SIB1. SIB1 itself has a
/// fixed schedule and needs no SIB1 contents; SIB2 is always carried by the
/// first schedulingInfoList entry.
pub fn si_periodicity_and_index(sib_index: u32, sib1: Option<&Sib1>) -> Option<(u32, u32)> {
    if sib_index == 0 {
        return Some((SIB1_PERIODICITY_FRAMES, 0));
    }
    let sib1 = sib1?;
    if sib_index == 1 {
        let first = sib1.sched_info_list.first()?;
        return Some((first.si_periodicity.frames(), 0));
    }
    // SIB3+ must be looked up in the sib-MappingInfo, which carries SIB
    // type numbers (sib_index + 1).
    for (n, si) in sib1.sched_info_list.iter().enumerate() {
        for &mapped in &si.sib_map_info {
            if mapped == sib_index + 1 {
                return Some((si.si_periodicity.frames(), n as u32));
            }
        }
    }
    None
}

/// Start TTI of the next SI-window.
///
/// `t` is the periodicity in frames, `offset` the frame offset and `a` the
/// subframe in which the window starts. The `1 +` selects the next
/// opportunity, never the current one.
pub fn sib_start_tti(tti: Tti, t: u32, offset: u32, a: u32) -> Tti {
    let tti = tti.to_u32();
    Tti::new(t * 10 * (1 + tti / (t * 10)) + offset * 10 + a)
}

/// Compute the SI-window `(start, length)` in subframes for the given SIB.
///
/// Returns `None` for SIB2+ when SIB1 is not available.
pub fn si_window(
    tti: Tti,
    sib_index: u32,
    n: u32,
    t: u32,
    sib1: Option<&Sib1>,
) -> Option<(Tti, u32)> {
    if sib_index == 0 {
        // SIB1 is always transmitted in subframe 5 of even frames.
        return Some((sib_start_tti(tti, 2, 0, 5), 1));
    }
    let w = sib1?.si_window_length.subframes();
    let x = n * w;
    let a = x % 10;
    let offset = x / 10;
    Some((sib_start_tti(tti, t, offset, a), w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{SchedInfo, SiPeriodicity, SiWindowLength};

    fn sib1_with_scheduling() -> Sib1 {
        Sib1 {
            sched_info_list: vec![
                SchedInfo {
                    si_periodicity: SiPeriodicity::Rf16,
                    sib_map_info: vec![],
                },
                SchedInfo {
                    si_periodicity: SiPeriodicity::Rf32,
                    sib_map_info: vec![3, 13],
                },
            ],
            si_window_length: SiWindowLength::Sf20,
            ..Sib1::default()
        }
    }

    #[test]
    fn test_periodicity_sib1() {
        assert_eq!(si_periodicity_and_index(0, None), Some((20, 0)));
    }

    #[test]
    fn test_periodicity_sib2_first_entry() {
        let sib1 = sib1_with_scheduling();
        assert_eq!(si_periodicity_and_index(1, Some(&sib1)), Some((16, 0)));
    }

    #[test]
    fn test_periodicity_mapped_sib() {
        let sib1 = sib1_with_scheduling();
        // SIB3 (index 2) maps to type number 3 in the second entry
        assert_eq!(si_periodicity_and_index(2, Some(&sib1)), Some((32, 1)));
        // SIB13 (index 12) maps to type number 13
        assert_eq!(si_periodicity_and_index(12, Some(&sib1)), Some((32, 1)));
    }

    #[test]
    fn test_periodicity_not_scheduled() {
        let sib1 = sib1_with_scheduling();
        assert_eq!(si_periodicity_and_index(4, Some(&sib1)), None);
    }

    #[test]
    fn test_periodicity_requires_sib1() {
        assert_eq!(si_periodicity_and_index(1, None), None);
    }

    #[test]
    fn test_sib_start_tti_is_next_opportunity() {
        // T = 2 frames, subframe 5: from TTI 0 the next chance is TTI 25
        assert_eq!(sib_start_tti(Tti::new(0), 2, 0, 5).to_u32(), 25);
        // from TTI 25 itself, the *next* window, never the current one
        assert_eq!(sib_start_tti(Tti::new(25), 2, 0, 5).to_u32(), 45);
    }

    #[test]
    fn test_sib_start_tti_wraps() {
        let start = sib_start_tti(Tti::new(10235), 2, 0, 5);
        assert!(start.to_u32() < 10240);
        assert_eq!(start.to_u32(), 5);
    }

    #[test]
    fn test_si_window_sib1() {
        let (start, len) = si_window(Tti::new(123), 0, 0, 20, None).unwrap();
        assert_eq!(len, 1);
        // SIB1 always lands in subframe 5 of an even frame pair
        assert_eq!(start.to_u32() % 20, 5);
        assert!(start.is_after(Tti::new(123)));
    }

    #[test]
    fn test_si_window_mapped() {
        let sib1 = sib1_with_scheduling();
        // n = 1, w = 20 -> x = 20 -> frame offset 2, subframe 0
        let (start, len) = si_window(Tti::new(0), 2, 1, 32, Some(&sib1)).unwrap();
        assert_eq!(len, 20);
        assert_eq!(start.to_u32(), 32 * 10 + 20);
    }

    #[test]
    fn test_si_window_needs_sib1() {
        assert!(si_window(Tti::new(0), 2, 1, 32, None).is_none());
    }

    #[test]
    fn test_window_start_in_range_across_wrap() {
        for base in [0u32, 5119, 10200, 10239] {
            for t in [8u32, 16, 32, 64, 128, 256, 512] {
                let start = sib_start_tti(Tti::new(base), t, 0, 0);
                assert!(start.to_u32() < 10240);
            }
        }
    }
}
