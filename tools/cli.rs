use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use scopetree::{IndentContext, MergingOptions, Registry, highlights};

#[derive(Parser)]
#[command(name = "scopetree", bin_name = "scopetree")]
#[command(about = "Builds syntax trees from TextMate-style grammars")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compiles and links grammars, then dumps the registry to a file
    #[command(after_help = r#"EXAMPLES:
  scopetree build -g grammars/ -o grammars.bin
  scopetree build -g json.json -g markdown.json --alias json:jsonc -o grammars.bin"#)]
    Build {
        #[command(flatten)]
        grammars: GrammarArgs,

        /// `name:alias` pairs
        #[arg(long, value_name = "NAME:ALIAS")]
        alias: Vec<String>,

        #[arg(long, short = 'o', value_name = "FILE")]
        output: PathBuf,
    },

    /// Parses a file and prints its tree
    #[command(after_help = r#"EXAMPLES:
  scopetree parse -r grammars.bin -l json data.json
  scopetree parse -g json.json -l json --highlights < data.json"#)]
    Parse {
        #[command(flatten)]
        grammars: GrammarArgs,

        /// Language to parse with: name, alias, scope name or file type
        #[arg(long, short = 'l', value_name = "LANG")]
        lang: String,

        /// Input file, stdin when missing
        input: Option<PathBuf>,

        /// Check the structural invariants of the tree and fail on any defect
        #[arg(long)]
        validate: bool,

        /// Print highlight spans as JSON instead of the tree
        #[arg(long)]
        highlights: bool,

        /// Print the foldable ranges after the tree
        #[arg(long)]
        folds: bool,

        /// Print the raw scan events instead of the tree
        #[arg(long)]
        events: bool,
    },

    /// Prints the indentation of a line
    Indent {
        #[command(flatten)]
        grammars: GrammarArgs,

        #[arg(long, short = 'l', value_name = "LANG")]
        lang: String,

        input: PathBuf,

        /// 1-based line number
        #[arg(long)]
        line: usize,

        #[arg(long, default_value_t = 4)]
        unit: usize,
    },
}

#[derive(Args)]
struct GrammarArgs {
    /// Grammar files or directories of grammar files
    #[arg(long, short = 'g', value_name = "PATH")]
    grammar: Vec<PathBuf>,

    /// A registry previously dumped with `build`
    #[arg(long, short = 'r', value_name = "FILE", conflicts_with = "grammar")]
    registry: Option<PathBuf>,
}

impl GrammarArgs {
    fn load(&self) -> Result<Registry, Box<dyn std::error::Error>> {
        if let Some(path) = &self.registry {
            return Ok(Registry::load_from_file(path)?);
        }

        let mut registry = Registry::default();
        for path in &self.grammar {
            if path.is_dir() {
                let mut entries: Vec<_> = fs::read_dir(path)?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| p.extension() == Some("json".as_ref()))
                    .collect();
                entries.sort();
                for entry in entries {
                    add_grammar(&mut registry, &entry);
                }
            } else {
                add_grammar(&mut registry, path);
            }
        }
        registry.link()?;
        Ok(registry)
    }
}

fn add_grammar(registry: &mut Registry, path: &Path) {
    if let Err(e) = registry.add_grammar_from_path(path) {
        eprintln!("✗ Failed to load grammar {}: {e}", path.display());
    }
}

fn read_input(input: Option<&Path>) -> std::io::Result<String> {
    match input {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match cli.command {
        Command::Build {
            grammars,
            alias,
            output,
        } => {
            let mut registry = grammars.load()?;
            for pair in &alias {
                match pair.split_once(':') {
                    Some((name, alias)) => registry.add_alias(name, alias),
                    None => eprintln!("✗ Ignoring alias {pair:?}, expected NAME:ALIAS"),
                }
            }
            registry.dump_to_file(&output)?;
            println!(
                "✓ {} grammars written to {}",
                registry.grammars().count(),
                output.display()
            );
        }
        Command::Parse {
            grammars,
            lang,
            input,
            validate,
            highlights: print_highlights,
            folds,
            events,
        } => {
            let registry = grammars.load()?;
            let parser = registry.parser(&lang)?;
            let text = read_input(input.as_deref())?;

            if events {
                for event in parser.scan(&text) {
                    println!("{event:?}");
                }
                return Ok(ExitCode::SUCCESS);
            }

            let tree = parser.parse(&text);
            if print_highlights {
                let spans = highlights(&tree, &text, MergingOptions::default());
                println!("{}", serde_json::to_string_pretty(&spans)?);
            } else {
                print!("{tree}");
            }
            if folds {
                for range in tree.foldable_ranges(&text) {
                    println!("fold {range:?}");
                }
            }
            if validate {
                let defects = tree.validate();
                for defect in &defects {
                    eprintln!("✗ {defect}");
                }
                if !defects.is_empty() {
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Indent {
            grammars,
            lang,
            input,
            line,
            unit,
        } => {
            let registry = grammars.load()?;
            let text = fs::read_to_string(&input)?;
            let tree = registry.parser(&lang)?.parse(&text);
            let pos = text
                .split_inclusive('\n')
                .take(line.saturating_sub(1))
                .map(str::len)
                .sum();
            match tree.indentation(&text, pos, &IndentContext::new(unit)) {
                Some(columns) => println!("{columns}"),
                None => println!("-"),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("✗ {e}");
            ExitCode::FAILURE
        }
    }
}
