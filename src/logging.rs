use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

/// Initialize logging system
/// - Console logging is enabled when RUST_LOG is set, or when `verbose` is requested
/// - File logging is enabled when PROTO_AGENT_LOG_TO_FILE is set (per-session setup later)
pub fn init_logging(verbose: bool) {
    let rust_log_present = env::var("RUST_LOG").is_ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if rust_log_present || verbose {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_file(rust_log_present)
            .with_line_number(rust_log_present)
            .with_writer(std::io::stderr);

        // try_init: tests and embedding hosts may have installed a subscriber already
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry().with(env_filter).try_init();
    }
}

/// Setup file logging for one agent session
/// Call this once the session id is known
pub fn setup_session_file_logging(session_id: &str) -> anyhow::Result<Option<PathBuf>> {
    if env::var("PROTO_AGENT_LOG_TO_FILE").is_err() {
        return Ok(None);
    }

    let logs_dir = get_logs_dir()?;
    if !logs_dir.exists() {
        std::fs::create_dir_all(&logs_dir)?;
    }

    let log_file_path = logs_dir.join(format!("{}.log", session_id));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)?;

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    log_info(&format!(
        "File logging enabled: {}",
        log_file_path.display()
    ));

    Ok(Some(log_file_path))
}

fn get_logs_dir() -> anyhow::Result<PathBuf> {
    let home_dir =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home_dir.join(".proto-agent").join("logs"))
}

fn write_to_file(level: &str, msg: &str) {
    if let Ok(mut guard) = LOG_FILE.lock()
        && let Some(ref mut file) = *guard
    {
        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let _ = writeln!(file, "[{}] [{}] [proto-agent] {}", timestamp, level, msg);
        let _ = file.flush();
    }
}

pub fn log_error(msg: &str) {
    error!("{msg}");
    write_to_file("ERROR", msg);
}

pub fn log_warn(msg: &str) {
    warn!("{msg}");
    write_to_file("WARN", msg);
}

pub fn log_info(msg: &str) {
    info!("{msg}");
    write_to_file("INFO", msg);
}

pub fn log_debug(msg: &str) {
    debug!("{msg}");
    write_to_file("DEBUG", msg);
}

pub fn log_trace(msg: &str) {
    trace!("{msg}");
    write_to_file("TRACE", msg);
}
