use std::env;
use std::process::Command;

/// Trimmed stdout of a successful git command
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() { return None }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Commit the engine was built from, `-dirty` when the work tree had local changes
fn engine_revision() -> Option<String> {
    if let Ok(sha) = env::var("CPDP_GIT_SHA") {
        let sha = sha.trim();
        return if sha.is_empty() { None } else { Some(sha.to_string()) };
    }

    let sha = git(&["rev-parse", "--short", "HEAD"]).filter(|s| !s.is_empty())?;
    let dirty = git(&["status", "--porcelain", "--untracked-files=no"]).map(|s| !s.is_empty()).unwrap_or(false);
    Some(if dirty { format!("{}-dirty", sha) } else { sha })
}

fn main() {
    for watched in [".git/HEAD", ".git/refs", ".git/index"] {
        println!("cargo:rerun-if-changed={}", watched);
    }
    println!("cargo:rerun-if-env-changed=CPDP_GIT_SHA");

    if let Some(revision) = engine_revision() {
        println!("cargo:rustc-env=CPDP_GIT_SHA={}", revision);
    }
    println!("cargo:rustc-env=CPDP_BUILD_PROFILE={}", env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string()));
}
