use std::path::PathBuf;

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_sensehat")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "sensehat.exe"
            } else {
                "sensehat"
            });
            p
        })
}

#[test]
fn cli_scroll_writes_movie_and_dry_run_plays_it() {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();

    let out_path = dir.join("scroll.bin");
    let _ = std::fs::remove_file(&out_path);
    let out_arg = out_path.to_string_lossy().to_string();

    let status = std::process::Command::new(exe())
        .args(["scroll", "--color", "#00FF00", "--wait-ms", "1", "--out"])
        .arg(out_arg.as_str())
        .status()
        .unwrap();
    assert!(status.success());

    let movie = sensehat::Movie::from_path(&out_path).unwrap();
    assert_eq!(movie.frame_count(), 16);
    assert_eq!((movie.width(), movie.height()), (8, 8));

    let status = std::process::Command::new(exe())
        .args(["play", "--dry-run", "--movie"])
        .arg(out_arg.as_str())
        .status()
        .unwrap();
    assert!(status.success());
}

#[test]
fn cli_rejects_bad_color() {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();
    let out_path = dir.join("never.bin");

    let status = std::process::Command::new(exe())
        .args(["scroll", "--color", "nope", "--out"])
        .arg(out_path.to_string_lossy().as_ref())
        .status()
        .unwrap();
    assert!(!status.success());
    assert!(!out_path.exists());
}
