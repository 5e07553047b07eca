use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportBackend {
    Jsonl,
    Csv,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Remove PID DRM from one or more books
    Decrypt(DecryptArgs),
    /// Print the Kindle PID for a device serial or UDID
    Pid {
        serial: String,
    },
    /// Show header, encryption and DRM table details for a book
    Info {
        input: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// Input books (.mobi, .azw, .prc)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output directory for decrypted books and reports
    #[arg(short, long, default_value = "./output")]
    pub output: PathBuf,

    /// Candidate PIDs (comma-separated, 8 or 10 characters)
    #[arg(long, value_delimiter = ',')]
    pub pids: Vec<String>,

    /// Kindle serials or UDIDs to derive PIDs from (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub serials: Vec<String>,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Number of worker threads
    #[arg(long, default_value_t = num_cpus::get())]
    pub workers: usize,

    /// Report backend
    #[arg(long, value_enum, default_value_t = ReportBackend::Jsonl)]
    pub report: ReportBackend,

    /// Leave EXTH reader restrictions as they are
    #[arg(long)]
    pub keep_restrictions: bool,

    /// Replace existing output files
    #[arg(long)]
    pub overwrite: bool,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, Command, ReportBackend};
    use clap::Parser;

    #[test]
    fn parses_pid_list() {
        let opts = CliOptions::try_parse_from([
            "mobistrip",
            "decrypt",
            "book.azw",
            "--pids",
            "ABCDEFGH,ZXCVBNM1JS",
        ])
        .expect("parse");
        let Command::Decrypt(args) = opts.command else {
            panic!("expected decrypt");
        };
        assert_eq!(args.pids, vec!["ABCDEFGH", "ZXCVBNM1JS"]);
        assert_eq!(args.report, ReportBackend::Jsonl);
        assert!(!args.keep_restrictions);
    }

    #[test]
    fn parses_many_inputs_and_csv_report() {
        let opts = CliOptions::try_parse_from([
            "mobistrip",
            "decrypt",
            "a.azw",
            "b.mobi",
            "--report",
            "csv",
            "--overwrite",
            "-o",
            "out",
        ])
        .expect("parse");
        let Command::Decrypt(args) = opts.command else {
            panic!("expected decrypt");
        };
        assert_eq!(args.inputs.len(), 2);
        assert_eq!(args.report, ReportBackend::Csv);
        assert!(args.overwrite);
        assert_eq!(args.output.to_str(), Some("out"));
    }

    #[test]
    fn decrypt_requires_input() {
        assert!(CliOptions::try_parse_from(["mobistrip", "decrypt"]).is_err());
    }

    #[test]
    fn parses_pid_subcommand() {
        let opts =
            CliOptions::try_parse_from(["mobistrip", "pid", "B001A1B2C3D4E5F6"]).expect("parse");
        assert!(matches!(opts.command, Command::Pid { serial } if serial == "B001A1B2C3D4E5F6"));
    }
}
