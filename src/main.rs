//! Main entry point for the ooxml-inspect CLI application.
//!
//! Opens a package through [`FileSession`], then lists, checks or dumps
//! the selected entries.

use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ooxml_inspect::{Cli, EntryMetadata, FileSession};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut session = FileSession::new();
    session
        .open(&cli.file, !cli.read_write)
        .with_context(|| format!("cannot open {}", cli.file))?;
    session.count_entries()?;

    let result = run(&session, &cli);
    session.close();
    result
}

fn init_logging(cli: &Cli) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_directive())),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(session: &FileSession, cli: &Cli) -> Result<()> {
    let entries = session.entries().unwrap_or_default();
    let selected: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, meta)| is_selected(meta, cli))
        .map(|(index, _)| index)
        .collect();

    let mut out = io::stdout().lock();
    if cli.verbose {
        list_verbose(&mut out, entries, &selected)?;
    } else if cli.tree {
        list_tree(&mut out, entries, &selected)?;
    } else if cli.list {
        for &index in &selected {
            writeln!(out, "{}", display_name(&entries[index]))?;
        }
    } else if cli.check {
        check_entries(&mut out, session, entries, &selected)?;
    } else {
        dump_entries(&mut out, session, entries, &selected, !cli.no_data)?;
    }
    out.flush()?;
    Ok(())
}

/// Apply the positional filters and the `-x` exclusions to one entry.
/// Entries without a name only show up when no filter is given.
fn is_selected(meta: &EntryMetadata, cli: &Cli) -> bool {
    let Some(name) = meta.name.as_deref() else {
        return cli.entries.is_empty();
    };

    if !cli.entries.is_empty() {
        let matches = cli.entries.iter().any(|f| {
            if has_glob_chars(f) {
                glob_match(f, name)
            } else {
                name == f.as_str() || meta.file_name() == f.as_str()
            }
        });
        if !matches {
            return false;
        }
    }

    !cli.exclude
        .iter()
        .any(|x| name.contains(x.as_str()) || glob_match(x, name))
}

fn display_name(meta: &EntryMetadata) -> &str {
    meta.name.as_deref().unwrap_or("<unnamed>")
}

/// Detailed table with size, compression ratio and timestamp.
fn list_verbose<W: Write>(out: &mut W, entries: &[EntryMetadata], selected: &[usize]) -> io::Result<()> {
    writeln!(
        out,
        "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
        "Length", "Size", "Cmpr", "Date", "Time"
    )?;
    writeln!(out, "{}", "-".repeat(70))?;

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for &index in selected {
        let meta = &entries[index];
        let (date, time) = match meta.mtime {
            Some(mtime) => (
                mtime.format("%Y-%m-%d").to_string(),
                mtime.format("%H:%M").to_string(),
            ),
            None => ("-".repeat(10), "-".repeat(5)),
        };
        writeln!(
            out,
            "{:>10}  {:>10}  {}  {}  {}  {}",
            or_dash(meta.size),
            or_dash(meta.compressed_size),
            ratio(meta.compressed_size.unwrap_or(0), meta.size.unwrap_or(0)),
            date,
            time,
            display_name(meta)
        )?;

        if !meta.is_directory() {
            total_uncompressed += meta.size.unwrap_or(0);
            total_compressed += meta.compressed_size.unwrap_or(0);
            file_count += 1;
        }
    }

    writeln!(out, "{}", "-".repeat(70))?;
    writeln!(
        out,
        "{:>10}  {:>10}  {}  {:>17}  {} files",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count
    )
}

fn or_dash(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Percentage saved by compression.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Entries grouped under their directory, directories in sorted order.
fn list_tree<W: Write>(out: &mut W, entries: &[EntryMetadata], selected: &[usize]) -> io::Result<()> {
    let mut groups: BTreeMap<&str, Vec<&EntryMetadata>> = BTreeMap::new();
    for &index in selected {
        let meta = &entries[index];
        if meta.is_directory() {
            continue;
        }
        groups.entry(meta.directory()).or_default().push(meta);
    }

    for (dir, files) in groups {
        if dir.is_empty() {
            writeln!(out, "/")?;
        } else {
            writeln!(out, "{dir}/")?;
        }
        for meta in files {
            let size = meta.size.map_or_else(|| "?".to_string(), format_size);
            writeln!(out, "    {}  ({})", meta.file_name(), size)?;
        }
    }
    Ok(())
}

/// Run the streaming well-formedness check over each selected entry.
fn check_entries<W: Write>(
    out: &mut W,
    session: &FileSession,
    entries: &[EntryMetadata],
    selected: &[usize],
) -> Result<()> {
    let mut failed = 0usize;
    let mut checked = 0usize;

    for &index in selected {
        let meta = &entries[index];
        let Some(name) = meta.name.as_deref() else {
            continue;
        };
        if meta.is_directory() {
            continue;
        }
        checked += 1;
        match session.parse_entry_xml(name) {
            Ok(doc) => writeln!(out, "ok    {name}  <{}> {} elements", doc.root.name, doc.element_count())?,
            Err(e) => {
                failed += 1;
                writeln!(out, "FAIL  {name}: {e}")?;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {checked} entries are not well-formed XML");
    }
    Ok(())
}

/// Print each entry as a `==== name(cb=N) ====` header followed by its
/// document or raw bytes.
fn dump_entries<W: Write>(
    out: &mut W,
    session: &FileSession,
    entries: &[EntryMetadata],
    selected: &[usize],
    fetch_data: bool,
) -> Result<()> {
    let mut failed = 0usize;

    for &index in selected {
        let entry = match session.get_entry(index, fetch_data) {
            Ok(entry) => entry,
            Err(e) => {
                let meta = &entries[index];
                writeln!(
                    out,
                    "==== {}(cb={}) ====",
                    display_name(meta),
                    meta.size.unwrap_or(0)
                )?;
                warn!(index, error = %e, "cannot read entry");
                failed += 1;
                continue;
            }
        };

        writeln!(out, "==== {}(cb={}) ====", entry.name, entry.length)?;
        let Some(bytes) = entry.bytes().filter(|b| !b.is_empty()) else {
            continue;
        };
        match &entry.document {
            Some(doc) => {
                writeln!(out, "xml: ")?;
                doc.write_to(&mut *out)?;
                writeln!(out)?;
            }
            None => {
                writeln!(out, "raw_data: ")?;
                out.write_all(bytes)?;
                writeln!(out)?;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} entries could not be read");
    }
    Ok(())
}

fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` and the text position it was tried at
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                // Let the last star absorb one more character
                Some((sp, st)) => {
                    star = Some((sp, st + 1));
                    p = sp + 1;
                    t = st + 1;
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
