use clap::Parser;
use rand::Rng;

/// Shared-sky synchronization client configuration
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Relay websocket endpoint to connect to.
    #[arg(
        long,
        value_name = "URL",
        default_value = "wss://app.xairline.org/apis/mp"
    )]
    pub server_url: String,

    /// Bearer token sent as the auth query parameter.
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Read the token from a key=value credentials file (first line only).
    #[arg(long, value_name = "FILE")]
    pub token_file: Option<String>,

    /// Entity id used in outgoing telegrams. Defaults to a generated callsign.
    #[arg(long, value_name = "ID")]
    pub entity_id: Option<String>,

    /// Orbit center latitude for the built-in state source.
    #[arg(long, value_name = "DEG", default_value_t = 37.618805)]
    pub latitude: f64,

    /// Orbit center longitude for the built-in state source.
    #[arg(long, value_name = "DEG", default_value_t = -122.375416)]
    pub longitude: f64,

    /// Orbit elevation in meters.
    #[arg(long, value_name = "METERS", default_value_t = 300.0)]
    pub elevation_m: f64,

    /// Record every sampled remote state in CSV format to a local file.
    #[arg(long, value_name = "FILE")]
    pub write_csv: Option<String>,

    /// Directory for status output (entities.json)
    #[arg(long, value_name = "DIR", default_value = "")]
    pub work_dir: String,

    /// Status logging interval in seconds, -1 to disable
    #[arg(long, default_value_t = 15)]
    pub status_interval: i32,

    /// Verbose logging (DEBUG level)
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

/// Resolve the bearer token from the command line or a token file. A
/// missing token is not an error; the transport connects unauthenticated.
pub fn resolve_token(config: &Config) -> std::io::Result<Option<String>> {
    if let Some(token) = &config.token {
        return Ok(Some(token.clone()));
    }
    if let Some(path) = &config.token_file {
        return read_token_file(path).map(Some);
    }
    Ok(None)
}

/// Read a bearer token from a key=value credentials file. Only the first
/// line is considered; everything after the first '=' is the token.
pub fn read_token_file(path: &str) -> std::io::Result<String> {
    let contents = std::fs::read_to_string(path)?;
    let first_line = contents.lines().next().unwrap_or("");
    match first_line.split_once('=') {
        Some((_, value)) => Ok(value.trim().to_string()),
        None => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("no '=' in first line of {}", path),
        )),
    }
}

/// Generate a callsign-style entity id (RW plus four digits).
pub fn generate_entity_id() -> String {
    let mut rng = rand::thread_rng();
    format!("RW{:04}", rng.gen_range(0..10000))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("airsync_{}_{}", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_read_token_file() {
        let path = write_temp("token", "auth=abc123\nother=junk\n");
        let token = read_token_file(path.to_str().unwrap()).unwrap();
        assert_eq!(token, "abc123");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_token_file_keeps_later_equals() {
        let path = write_temp("token_eq", "auth=a=b\n");
        let token = read_token_file(path.to_str().unwrap()).unwrap();
        assert_eq!(token, "a=b");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_token_file_rejects_missing_separator() {
        let path = write_temp("token_bad", "just a token\n");
        assert!(read_token_file(path.to_str().unwrap()).is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_token_file_missing_file() {
        assert!(read_token_file("/nonexistent/airsync/token").is_err());
    }

    #[test]
    fn test_resolve_token_prefers_flag() {
        let mut config = Config::parse_from(["airsync"]);
        config.token = Some("direct".to_string());
        config.token_file = Some("/nonexistent/airsync/token".to_string());
        assert_eq!(resolve_token(&config).unwrap(), Some("direct".to_string()));
    }

    #[test]
    fn test_resolve_token_none_configured() {
        let config = Config::parse_from(["airsync"]);
        assert_eq!(resolve_token(&config).unwrap(), None);
    }

    #[test]
    fn test_generate_entity_id_shape() {
        for _ in 0..20 {
            let id = generate_entity_id();
            assert_eq!(id.len(), 6);
            assert!(id.starts_with("RW"));
            assert!(id[2..].chars().all(|c| c.is_ascii_digit()));
        }
    }
}
