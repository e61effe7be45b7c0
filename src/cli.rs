use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ooxml-inspect")]
#[command(version)]
#[command(about = "Inspect the parts of an Office Open XML package", long_about = None)]
#[command(after_help = "Examples:\n  \
  ooxml-inspect -l report.docx                 list parts\n  \
  ooxml-inspect report.docx 'word/*.xml'       dump the XML parts under word/\n  \
  ooxml-inspect -c book.xlsx -x '*.bin'        check every part except binaries\n  \
  RUST_LOG=ooxml_inspect=debug ooxml-inspect -N slides.pptx")]
pub struct Cli {
    /// OOXML package (or any ZIP archive)
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Entries to process (default: all)
    #[arg(value_name = "ENTRIES")]
    pub entries: Vec<String>,

    /// List entry names
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely with sizes and timestamps
    #[arg(short = 'v')]
    pub verbose: bool,

    /// List entries grouped by directory
    #[arg(short = 't')]
    pub tree: bool,

    /// Check that entries are well-formed XML, streaming them from the archive
    #[arg(short = 'c')]
    pub check: bool,

    /// Print entry headers without fetching content
    #[arg(short = 'N', long = "no-data")]
    pub no_data: bool,

    /// Exclude entries that follow
    #[arg(short = 'x', value_name = "ENTRY", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Open the file for read+write (fails on read-only files)
    #[arg(long = "rw")]
    pub read_write: bool,

    /// Quiet mode: only report errors
    #[arg(short = 'q')]
    pub quiet: bool,

    /// Emit debug logging
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    pub fn is_listing(&self) -> bool {
        self.list || self.verbose || self.tree
    }

    /// Default `tracing` directive when `RUST_LOG` is unset.
    pub fn log_directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from(["ooxml-inspect", "-N", "a.docx", "word/*.xml", "-x", "*.png"]).unwrap();
        assert_eq!(cli.file, "a.docx");
        assert_eq!(cli.entries, ["word/*.xml"]);
        assert_eq!(cli.exclude, ["*.png"]);
        assert!(cli.no_data);
        assert!(!cli.is_listing());
        assert_eq!(cli.log_directive(), "warn");
    }

    #[test]
    fn test_log_directive() {
        let cli = Cli::try_parse_from(["ooxml-inspect", "-q", "a.xlsx"]).unwrap();
        assert_eq!(cli.log_directive(), "error");
        let cli = Cli::try_parse_from(["ooxml-inspect", "--debug", "-t", "a.xlsx"]).unwrap();
        assert_eq!(cli.log_directive(), "debug");
        assert!(cli.is_listing());
    }
}
