//! Command dispatch: load the outline, run the command, save when it changed.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::{generate, Shell};
use tracing::{debug, instrument};

use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, Settings};
use crate::display::{label, outline_lines, to_tree_string};
use crate::domain::{NodeIndex, Tree};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Err(CliError::Usage(
            "no command given, see `lifetree --help`".to_string(),
        ));
    };
    if let Some(query) = command_query(command) {
        if query.trim().is_empty() {
            return Err(CliError::InvalidArgs("query must not be empty".to_string()));
        }
    }
    match command {
        Commands::Completion { shell } => _completion(*shell),
        Commands::Config { command } => _config(command, cli.config.as_deref()),
        command => {
            let settings = Settings::load(cli.config.as_deref())?;
            let container = ServiceContainer::new(settings);
            let path = cli
                .file
                .clone()
                .unwrap_or_else(|| container.outline.data_file().to_path_buf());
            debug!("outline file: {}", path.display());
            match command {
                Commands::Show { query, outline } => {
                    _show(&container, &path, query.as_deref(), *outline)
                }
                Commands::Find { query, active } => _find(&container, &path, query, *active),
                Commands::Create { query, new, active } => {
                    _create(&container, &path, query, *new, *active)
                }
                Commands::Activate { query, force } => _activate(&container, &path, query, *force),
                Commands::Finish { query } => _finish(&container, &path, query),
                Commands::Unfinish { query } => _unfinish(&container, &path, query),
                Commands::Completion { .. } | Commands::Config { .. } => Ok(()),
            }
        }
    }
}

fn command_query(command: &Commands) -> Option<&str> {
    match command {
        Commands::Show { query, .. } => query.as_deref(),
        Commands::Find { query, .. }
        | Commands::Create { query, .. }
        | Commands::Activate { query, .. }
        | Commands::Finish { query }
        | Commands::Unfinish { query } => Some(query),
        Commands::Config { .. } | Commands::Completion { .. } => None,
    }
}

fn start_node(tree: &Tree, from_active: bool) -> NodeIndex {
    if from_active {
        tree.active()
    } else {
        tree.root()
    }
}

#[instrument(skip(container))]
fn _show(
    container: &ServiceContainer,
    path: &Path,
    query: Option<&str>,
    outline: bool,
) -> CliResult<()> {
    let mut tree = container.outline.load_or_new(path)?;
    let root = tree.root();
    let nodes = match query {
        Some(query) => tree.find_str(root, query)?,
        None => vec![root],
    };
    if nodes.is_empty() {
        output::warning("no matches");
    }
    for node in nodes {
        if outline {
            if node != root {
                output::header(&tree, node);
            }
            for line in outline_lines(&mut tree, node) {
                output::plain(&line);
            }
        } else {
            output::plain(&to_tree_string(&mut tree, node));
        }
    }
    Ok(())
}

#[instrument(skip(container))]
fn _find(container: &ServiceContainer, path: &Path, query: &str, active: bool) -> CliResult<()> {
    let mut tree = container.outline.load_or_new(path)?;
    let start = start_node(&tree, active);
    let found = tree.find_str(start, query)?;
    if found.is_empty() {
        output::warning(&format!("no matches for '{query}'"));
    }
    for node in found {
        output::node(&tree, node);
    }
    Ok(())
}

#[instrument(skip(container))]
fn _create(
    container: &ServiceContainer,
    path: &Path,
    query: &str,
    new: bool,
    active: bool,
) -> CliResult<()> {
    let mut tree = container.outline.load_or_new(path)?;
    let start = start_node(&tree, active);
    let before = tree.id_count();
    let node = if new {
        tree.create_str(start, query)?
    } else {
        tree.find_or_create_str(start, query)?
    };
    if tree.id_count() == before {
        output::changed("found", &tree, node);
        return Ok(());
    }
    container.outline.save(&tree, path)?;
    output::changed("created", &tree, node);
    Ok(())
}

#[instrument(skip(container))]
fn _activate(container: &ServiceContainer, path: &Path, query: &str, force: bool) -> CliResult<()> {
    let mut tree = container.outline.load_or_new(path)?;
    let root = tree.root();
    let node = tree.find_one_str(root, query)?;
    if !tree.activate(node, force)? {
        output::warning(&format!(
            "{} cannot be activated (use --force to reopen it)",
            label(&tree, node)
        ));
        return Ok(());
    }
    container.outline.save(&tree, path)?;
    output::changed("active", &tree, node);
    Ok(())
}

#[instrument(skip(container))]
fn _finish(container: &ServiceContainer, path: &Path, query: &str) -> CliResult<()> {
    let mut tree = container.outline.load_or_new(path)?;
    let root = tree.root();
    let node = tree.find_one_str(root, query)?;
    tree.finish(node)?;
    container.outline.save(&tree, path)?;
    output::changed("finished", &tree, node);
    Ok(())
}

#[instrument(skip(container))]
fn _unfinish(container: &ServiceContainer, path: &Path, query: &str) -> CliResult<()> {
    let mut tree = container.outline.load_or_new(path)?;
    let root = tree.root();
    let node = tree.find_one_str(root, query)?;
    if !tree.unfinish(node)? {
        output::warning(&format!("{} stays finished", label(&tree, node)));
        return Ok(());
    }
    container.outline.save(&tree, path)?;
    output::changed("reopened", &tree, node);
    Ok(())
}

fn _config(command: &ConfigCommands, config_file: Option<&Path>) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load(config_file)?;
            output::plain(&settings.to_toml()?);
        }
        ConfigCommands::Template => output::plain(&Settings::template()),
        ConfigCommands::Path => {
            let settings = Settings::load(config_file)?;
            let config = config_file
                .map(Path::to_path_buf)
                .or_else(global_config_path)
                .unwrap_or_else(|| PathBuf::from("(no config directory)"));
            output::setting("config", &config.display());
            output::setting("data", &settings.data_file.display());
        }
    }
    Ok(())
}

fn _completion(shell: Shell) -> CliResult<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    eprintln!("Generating completion file for {shell:?}...");
    let mut out = io::stdout().lock();
    generate(shell, &mut cmd, name, &mut out);
    out.flush()
        .map_err(|e| InfraError::output("completions", e))?;
    Ok(())
}
