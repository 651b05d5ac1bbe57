use std::path::PathBuf;
use std::time::Duration;

use sensehat::{
    BufferPool, CancelToken, Color, InMemorySink, Movie, PixelFormat, PlaybackOutcome,
    SenseHatError, play_movie,
};

fn temp_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "sensehat_movie_format_{name}_{}_{nanos}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn sample(frames: usize) -> Movie {
    let mut m = Movie::new(3, 2, frames).unwrap();
    for i in 0..frames {
        let c = Color::encode(PixelFormat::Rgb565, (i * 40) as u8, 0x80, (255 - i * 30) as u8);
        let mut f = m.frame_mut(i).unwrap();
        f.set_pixel((i % 3) as u8, (i % 2) as u8, c).unwrap();
        f.fill(0, 1, 1, 1, Color::from_bytes([i as u8, 0xAB])).unwrap();
        m.set_wait(i, Duration::from_millis(10 * i as u64 + 1)).unwrap();
    }
    m
}

fn save(m: &Movie) -> Vec<u8> {
    let mut out = Vec::new();
    m.save(&mut out).unwrap();
    out
}

fn load(bytes: &[u8]) -> Result<Movie, SenseHatError> {
    let mut r = bytes;
    Movie::load(&mut r)
}

#[test]
fn round_trip_preserves_every_pixel_and_wait() {
    for frames in [0, 1, 5] {
        let m = sample(frames);
        let bytes = save(&m);
        assert_eq!(bytes.len(), 8 + frames * (3 * 2 * 2 + 4));

        let back = load(&bytes).unwrap();
        assert_eq!(back.frame_count(), frames);
        assert_eq!((back.width(), back.height()), (3, 2));
        for i in 0..frames {
            assert_eq!(back.frame(i).unwrap().bytes(), m.frame(i).unwrap().bytes());
            assert_eq!(back.wait(i).unwrap(), m.wait(i).unwrap());
        }
        assert_eq!(back, m);
    }
}

#[test]
fn header_layout_is_little_endian() {
    let bytes = save(&sample(5));
    assert_eq!(&bytes[..8], &[5, 0, 0, 0, 3, 2, 0, 0]);
    // Wait of frame 0 sits right after its 12 pixel bytes.
    assert_eq!(&bytes[8 + 12..8 + 16], &1i32.to_le_bytes());
}

#[test]
fn truncated_header_is_malformed() {
    for len in 0..8 {
        let bytes = save(&sample(1));
        let err = load(&bytes[..len]).unwrap_err();
        assert!(matches!(err, SenseHatError::Malformed(_)), "len {len}: {err}");
    }
}

#[test]
fn truncated_frame_blocks_are_malformed() {
    let bytes = save(&sample(5));
    for cut in [1, 4, 16, bytes.len() - 8 - 1] {
        let err = load(&bytes[..bytes.len() - cut]).unwrap_err();
        assert!(matches!(err, SenseHatError::Malformed(_)), "cut {cut}: {err}");
    }
}

#[test]
fn negative_frame_count_is_rejected() {
    let mut bytes = save(&sample(1));
    bytes[..4].copy_from_slice(&(-1i32).to_le_bytes());
    assert!(matches!(load(&bytes), Err(SenseHatError::Malformed(_))));
}

#[test]
fn reserved_bytes_are_ignored_and_written_as_zero() {
    let m = sample(1);
    let mut bytes = save(&m);
    bytes[6] = 0x5A;
    bytes[7] = 0xA5;
    bytes.extend_from_slice(&[9, 9, 9]);

    let back = load(&bytes).unwrap();
    assert_eq!(back, m);
    assert_eq!(&save(&back)[6..8], &[0, 0]);
}

#[test]
fn negative_waits_play_as_zero_but_survive_save() {
    let mut bytes = save(&sample(1));
    let at = 8 + 12;
    bytes[at..at + 4].copy_from_slice(&(-50i32).to_le_bytes());

    let m = load(&bytes).unwrap();
    assert_eq!(m.raw_wait_ms(0).unwrap(), -50);
    assert_eq!(m.wait(0).unwrap(), Duration::ZERO);
    assert_eq!(save(&m), bytes);
}

#[test]
fn wait_of_minus_one_does_not_hold_the_frame() {
    let mut bytes = save(&sample(2));
    let block = 12 + 4;
    for i in 0..2 {
        let at = 8 + i * block + 12;
        bytes[at..at + 4].copy_from_slice(&(-1i32).to_le_bytes());
    }

    let m = load(&bytes).unwrap();
    let sink = InMemorySink::new();
    let start = std::time::Instant::now();
    let report = play_movie(&m, &mut sink.clone(), &CancelToken::new()).unwrap();
    assert_eq!(report.outcome, PlaybackOutcome::Completed);
    assert_eq!(report.frames_written, 2);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn pooled_loads_return_buffers_on_drop() {
    let pool = BufferPool::default();
    let bytes = save(&sample(5));
    {
        let mut r = bytes.as_slice();
        let m = Movie::load_in(&pool, &mut r).unwrap();
        assert_eq!(m.frame_count(), 5);
    }
    assert_eq!(pool.stats().retained_buffers, 1);

    let mut r = bytes.as_slice();
    let _again = Movie::load_in(&pool, &mut r).unwrap();
    assert_eq!(pool.stats().reused_buffers, 1);
}

#[test]
fn file_round_trip() {
    let dir = temp_dir("file");
    let path = dir.join("nested").join("clip.bin");
    let m = sample(5);
    m.save_to_path(&path).unwrap();
    assert_eq!(Movie::from_path(&path).unwrap(), m);
    assert!(Movie::from_path(dir.join("missing.bin")).is_err());
}
