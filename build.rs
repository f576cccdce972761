use std::process::Command;

/// Trimmed stdout of a git invocation, if git is available and succeeds
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn main() {
    if let Some(hash) = git(&["describe", "--always", "--dirty"]) {
        println!("cargo:rustc-env=DELLFAN_GIT_HASH={}", hash);
    }
    println!(
        "cargo:rustc-env=DELLFAN_BUILD_TIME={}",
        chrono::Utc::now().to_rfc3339()
    );
    println!("cargo:rerun-if-changed=build.rs");
}
