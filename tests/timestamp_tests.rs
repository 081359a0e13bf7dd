// Integration tests for presentation timestamp normalization
//
// Video timestamps must be strictly increasing whatever the capture clock does;
// audio timestamps must follow the submitted sample count, not delivery timing.

use camrec::media::timestamp::TICK_US;
use camrec::{AudioTimestamps, VideoTimestamps};

#[test]
fn test_first_frame_is_time_zero() {
    let mut ts = VideoTimestamps::new();

    assert_eq!(ts.normalize(5_000_000_000), 0);
    assert_eq!(ts.normalize(5_033_000_000), 33_000);
    assert_eq!(ts.last_us(), Some(33_000));
}

#[test]
fn test_non_monotonic_capture_clock() {
    let mut ts = VideoTimestamps::new();
    let raw_ns = [100_000_000, 133_000_000, 120_000_000, 133_000_000, 166_000_000, 90_000_000];

    let normalized: Vec<i64> = raw_ns.iter().map(|&raw| ts.normalize(raw)).collect();

    assert_eq!(normalized[0], 0);
    assert_eq!(normalized[1], 33_000);
    // Backwards and repeated frames are pushed one tick past the previous one
    assert_eq!(normalized[2], 33_000 + TICK_US);
    assert_eq!(normalized[3], 33_000 + 2 * TICK_US);
    assert_eq!(normalized[4], 66_000);
    assert_eq!(normalized[5], 66_000 + TICK_US);

    for pair in normalized.windows(2) {
        assert!(pair[1] > pair[0], "{:?} is not strictly increasing", normalized);
    }
}

#[test]
fn test_sub_microsecond_spacing_stays_increasing() {
    let mut ts = VideoTimestamps::new();
    let first = ts.normalize(1_000);
    let second = ts.normalize(1_400);

    assert_eq!(first, 0);
    assert_eq!(second, TICK_US);
}

#[test]
fn test_audio_pts_follows_sample_count() {
    let mut ts = AudioTimestamps::new(44_100, 1);

    assert_eq!(ts.next_pts_us(), 0);
    ts.advance(4096); // 2048 frames
    assert_eq!(ts.frames_submitted(), 2048);
    assert_eq!(ts.next_pts_us(), 2048 * 1_000_000 / 44_100);
}

#[test]
fn test_audio_pts_independent_of_burst_sizes() {
    let rate = 48_000;
    let mut steady = AudioTimestamps::new(rate, 2);
    let mut bursty = AudioTimestamps::new(rate, 2);

    // One second of stereo 16-bit PCM delivered two different ways
    for _ in 0..100 {
        steady.advance(1920);
    }
    let mut remaining = 192_000usize;
    let bursts = [7usize, 4096, 13, 0, 1, 30_000, 3];
    let mut i = 0;
    while remaining > 0 {
        let n = bursts[i % bursts.len()].min(remaining);
        bursty.advance(n);
        remaining -= n;
        i += 1;
    }

    assert_eq!(steady.frames_submitted(), 48_000);
    assert_eq!(bursty.frames_submitted(), 48_000);
    assert!((bursty.next_pts_us() - 1_000_000).abs() <= 1);
    assert_eq!(steady.next_pts_us(), bursty.next_pts_us());
}

#[test]
fn test_audio_partial_frames_carry_over() {
    let mut ts = AudioTimestamps::new(8_000, 2);

    ts.advance(3); // less than one 4-byte frame
    assert_eq!(ts.frames_submitted(), 0);
    ts.advance(1);
    assert_eq!(ts.frames_submitted(), 1);
    assert_eq!(ts.next_pts_us(), 125);
}
