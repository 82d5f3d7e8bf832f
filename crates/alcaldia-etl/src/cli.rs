//! Command-line interface of `alcaldia-load`

use clap::{Parser, ValueEnum};

/// Alcaldía ETL - bulk loader for procurement open data
#[derive(Parser, Debug)]
#[command(name = "alcaldia-load")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Data type to load (`all` loads every registered type in dependency order)
    #[arg(short = 't', long, value_name = "TYPE", required_unless_present = "list_data_types")]
    pub data_type: Option<String>,

    /// Resolve configuration and print the plan without touching the database
    #[arg(long)]
    pub dry_run: bool,

    /// List the registered data types and exit
    #[arg(long, conflicts_with_all = ["data_type", "dry_run"])]
    pub list_data_types: bool,

    /// Summary format on stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_data_type_required() {
        assert!(Cli::try_parse_from(["alcaldia-load"]).is_err());
        assert!(Cli::try_parse_from(["alcaldia-load", "--list-data-types"]).is_ok());
    }

    #[test]
    fn test_parse_load_invocation() {
        let cli = Cli::try_parse_from(["alcaldia-load", "--data-type", "all", "--format", "json", "-v"]).unwrap();
        assert_eq!(cli.data_type.as_deref(), Some("all"));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.verbose);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_unknown_value_is_not_rejected_by_clap() {
        // Registry lookup reports unknown types with the list of valid ones
        let cli = Cli::try_parse_from(["alcaldia-load", "--data-type", "nonexistent"]).unwrap();
        assert_eq!(cli.data_type.as_deref(), Some("nonexistent"));
    }

    #[test]
    fn test_list_conflicts_with_data_type() {
        assert!(Cli::try_parse_from(["alcaldia-load", "--list-data-types", "--data-type", "all"]).is_err());
    }
}
