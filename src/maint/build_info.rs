/// Stamp injected by `build.rs`; `None` when built without it.
const BUILD_HOST: Option<&str> = option_env!("MAINTCTL_BUILD_HOST");
const BUILD_TIME: Option<&str> = option_env!("MAINTCTL_BUILD_TIME");

/// `epoch:<secs>` as a UTC timestamp. Anything else is shown verbatim.
fn render_build_time(raw: &str) -> String {
    let raw = raw.trim();
    raw.strip_prefix("epoch:")
        .and_then(|secs| secs.trim().parse::<i64>().ok())
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Help banner naming the host and time the binary was built.
pub fn banner() -> String {
    format!(
        "Maintenance controller (built on {} at {}).",
        BUILD_HOST.unwrap_or("unknown"),
        render_build_time(BUILD_TIME.unwrap_or("unknown"))
    )
}
