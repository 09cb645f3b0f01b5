use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "timespent")]
#[command(author, version, about = "Countdown focus timer with tagged history")]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    TIMESPENT_API_URL     History API base URL (default: settings file, else offline)
    TIMESPENT_DATA_DIR    Settings and cache directory
    RUST_LOG              Log filter (default: info)

WHILE A SESSION RUNS, type a line and press enter:
    p      pause or resume
    c      mark complete and record elapsed time
    r      reset, nothing is recorded
    +N     add N minutes (default 5)
    q      quit, abandoning the session

EXAMPLES:
    timespent start \"Write report #work\" --minutes 45
    timespent history --tag work
    timespent today
    timespent volume 0.3
")]
pub struct Cli {
    /// Directory holding settings.json and the history cache.
    #[arg(long, env = "TIMESPENT_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the history API. Overrides the settings file.
    #[arg(long, env = "TIMESPENT_API_URL", global = true)]
    pub api_url: Option<String>,

    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a countdown for a described task.
    ///
    /// Words prefixed with `#` become tags.
    Start {
        description: String,

        /// Countdown length; defaults to the configured duration.
        #[arg(short, long)]
        minutes: Option<u64>,

        /// Also store the duration as the new default.
        #[arg(long)]
        remember: bool,
    },

    /// List recorded sessions, grouped by day.
    History {
        /// Only entries carrying this tag.
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Sessions and minutes recorded today.
    Today,

    /// Delete one history entry.
    Delete { id: String },

    /// Delete every history entry.
    Clear {
        /// Required; there is no undo.
        #[arg(long)]
        yes: bool,
    },

    /// Resubmit entries that never reached the history API.
    Sync,

    /// Show duration presets and limits.
    Presets,

    /// Set the notification volume; 0 keeps the tone silent.
    Volume {
        #[arg(value_parser = parse_volume)]
        level: f32,
    },
}

fn parse_volume(raw: &str) -> Result<f32, String> {
    let level: f32 = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a number"))?;
    if (0.0..=1.0).contains(&level) {
        Ok(level)
    } else {
        Err("volume must be between 0 and 1".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_start_with_minutes() {
        let cli = Cli::try_parse_from(["timespent", "start", "Write report #work", "-m", "45"])
            .unwrap();
        match cli.command {
            Command::Start {
                description,
                minutes,
                remember,
            } => {
                assert_eq!(description, "Write report #work");
                assert_eq!(minutes, Some(45));
                assert!(!remember);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_volume_within_range() {
        let cli = Cli::try_parse_from(["timespent", "volume", "0.3"]).unwrap();
        match cli.command {
            Command::Volume { level } => assert_eq!(level, 0.3),
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["timespent", "volume", "1.5"]).is_err());
        assert!(Cli::try_parse_from(["timespent", "volume", "loud"]).is_err());
    }

    #[test]
    fn global_output_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["timespent", "history", "--tag", "work", "-o", "json"])
            .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
    }
}
