use clap::{Parser, Subcommand};

/// This is the intake and reporting program of the technostress survey.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON configuration file. See the manual of technostress_core
    /// for the list of options.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, optional) The CSV file holding the responses. Setting this option overrides
    /// the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub store: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Lists the statements of the questionnaire and the accepted answers.
    Questions,
    /// Records the answers of one participant.
    Submit(SubmitArgs),
    /// Shows the aggregate statistics (admin only).
    Report(ReportArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct SubmitArgs {
    /// Email address, student number or alias. It is only used to allow at most 2
    /// participations, and is never stored in clear.
    #[clap(short, long, value_parser)]
    pub identity: Option<String>,

    /// Address receiving the verification code, when email verification is enabled.
    #[clap(long, value_parser)]
    pub email: Option<String>,

    #[clap(long, value_parser)]
    pub gender: String,

    /// Age bracket: 18-21, 22-26, 27-35, 36-45, 46+
    #[clap(long, value_parser)]
    pub age: String,

    /// (free text) The department of study.
    #[clap(long, value_parser, default_value = "")]
    pub department: String,

    #[clap(long, value_parser)]
    pub mother_education: String,

    #[clap(long, value_parser)]
    pub father_education: String,

    /// Hours per day: 0-1, 2-5, 6-10, 10+
    #[clap(long, value_parser)]
    pub screen_time: String,

    /// Notifications per day: 0-30, 31-60, 61-100, 100+
    #[clap(long, value_parser)]
    pub notification_count: String,

    #[clap(long, value_parser)]
    pub notification_type: String,

    #[clap(long, value_parser)]
    pub device: String,

    /// (comma-separated list of 12 numbers between 1 and 5) The answers to S1..S12, in order.
    #[clap(long, value_parser, value_delimiter = ',', required = true)]
    pub scores: Vec<u8>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ReportArgs {
    /// The admin password. When empty or missing, nothing is shown.
    #[clap(short, long, value_parser)]
    pub password: Option<String>,

    /// If passed as an argument, every stored response is listed as well.
    #[clap(long, takes_value = false)]
    pub records: bool,

    /// (file path, 'stdout' or empty) If specified, the summary will be written in JSON format
    /// to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference JSON summary. If provided, the computed summary must match it.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,
}
