// Application configuration, loaded from environment variables and CLI flags.

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Username to run the session under. A random one is generated when unset.
    pub player_name: Option<String>,
    /// Fixed seed for item placement, for reproducible runs.
    pub rng_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:snake_game.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `PLAYER_NAME` - Username for the session
    /// - `SNAKE_RNG_SEED` - Fixed placement seed
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--player <NAME>` - Override the username
    /// - `--seed <SEED>` - Override the placement seed
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:snake_game.db?mode=rwc".to_string());

        // CLI flags take precedence, then env vars, then defaults
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        let player_name = Self::parse_cli_value(&args, "--player")
            .or_else(|| std::env::var("PLAYER_NAME").ok())
            .filter(|name| !name.is_empty());

        let rng_seed = Self::parse_cli_value(&args, "--seed")
            .or_else(|| std::env::var("SNAKE_RNG_SEED").ok())
            .and_then(|v| v.parse().ok());

        Config {
            database_url,
            port,
            player_name,
            rng_seed,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}
