use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "circadian-sync")]
#[command(version)]
#[command(about = "Upload date-partitioned data to a remote host, one verified day at a time")]
#[command(long_about = r#"
circadian-sync uploads dated files or directories (one per calendar day) to a
remote host over SSH. A day is uploaded once the next day is at least the grace
period old, verified by checksum, and optionally removed locally afterwards.

Interrupted runs are resumed by running again.

Examples:
  circadian-sync                          Run all jobs from the default config
  circadian-sync -c sync.toml --job ifgs  Run one job
  circadian-sync --list                   Show which days are due
"#)]
pub struct Cli {
    /// Configuration file (default: <config dir>/circadian-sync/config.toml)
    #[arg(short, long, env = "CIRCADIAN_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only run the named job (repeatable)
    #[arg(short, long = "job", value_name = "NAME")]
    pub jobs: Vec<String>,

    /// List the eligible units of each job without uploading
    #[arg(long)]
    pub list: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["circadian-sync"]).unwrap();
        assert!(cli.jobs.is_empty());
        assert!(!cli.list);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_jobs_and_flags() {
        let cli = Cli::try_parse_from([
            "circadian-sync",
            "-c",
            "sync.toml",
            "--job",
            "ifgs",
            "-j",
            "logs",
            "--list",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("sync.toml")));
        assert_eq!(cli.jobs, vec!["ifgs", "logs"]);
        assert!(cli.list);
        assert!(cli.verbose);
    }
}
