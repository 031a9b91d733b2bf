//! # Shell Completion Module
//!
//! Completion scripts come from clap's completion system. Fish additionally
//! gets artist names from the offline catalog for `catalog search`.
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! curator completion bash > ~/.local/share/bash-completion/completions/curator
//!
//! # Generate fish completions
//! curator completion fish > ~/.config/fish/completions/curator.fish
//! ```

use anyhow::Result;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io::{self, Write};
use std::path::Path;

use crate::catalog::SqliteCatalog;
use crate::cli::Shell;
use crate::provider::{EntityKind, Provider};

/// Generate shell completions for the given shell
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command, out: &mut dyn Write) {
    let name = cmd.get_name().to_string();
    generate(gen, cmd, name, out);
}

/// Convert our Shell enum to clap_complete's Shell enum
pub fn shell_to_completion_shell(shell: &Shell) -> CompletionShell {
    match shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Extra lines appended after the generated script.
pub fn dynamic_completion_hook(shell: &Shell) -> Option<&'static str> {
    match shell {
        Shell::Fish => Some(
            "\n# Artist names from the offline catalog\n\
             complete -c curator -f -n '__fish_seen_subcommand_from search' -a '(curator complete-artists 2>/dev/null)'\n",
        ),
        _ => None,
    }
}

/// Write the completion script for `shell` to stdout.
pub fn print_completions(shell: &Shell, cmd: &mut Command) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    generate_completions(shell_to_completion_shell(shell), cmd, &mut out);
    if let Some(hook) = dynamic_completion_hook(shell) {
        out.write_all(hook.as_bytes())?;
    }
    Ok(())
}

/// Artist names in the catalog at `path`, sorted.
///
/// A missing or unreadable catalog yields an empty list so completion never fails loudly.
pub fn artist_completions(path: &Path) -> Vec<String> {
    if !path.exists() {
        return Vec::new();
    }
    let names = SqliteCatalog::open(path)
        .ok()
        .and_then(|catalog| catalog.search("", EntityKind::Artist, None).ok())
        .map(|candidates| candidates.into_iter().map(|c| c.name).collect::<Vec<_>>());
    let mut names = names.unwrap_or_default();
    names.sort();
    names.dedup();
    names
}

/// Print artist names, one per line, for shell completion.
pub fn print_artist_completions(path: &Path) -> Result<()> {
    for name in artist_completions(path) {
        println!("{name}");
    }
    Ok(())
}
