use std::process::Command;

/// Short hash of the checked-out commit, "unknown" outside a git checkout
fn commit_hash() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let built_at = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", built_at);
    println!("cargo:rustc-env=GIT_COMMIT_HASH={}", commit_hash());

    for watched in [".git/HEAD", ".git/refs/heads"] {
        println!("cargo:rerun-if-changed={}", watched);
    }
}
