mod cli;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use reibun::adapters::{PairsFileSource, TatoebaSource};
use reibun::config_file::{FileConfig, load_file_config};
use reibun::segment::SpaceSegmenter;
use reibun::{CorpusEngine, Sentence};

use cli::{Cli, Command};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_file_config(path),
        None => FileConfig::default(),
    };

    match cli.command {
        Command::Init { db } => {
            if db.exists() {
                eprintln!("Refusing to overwrite existing file: {}", db.display());
                std::process::exit(2);
            }
            let _ = CorpusEngine::open(&db, config, Box::new(SpaceSegmenter))?;
            println!("Created {}", db.display());
            Ok(())
        }

        Command::Get {
            db,
            words,
            limit,
            produce,
            json,
        } => {
            let mut engine = open_engine(&db, config)?;
            if produce {
                let source = tatoeba_source(&engine);
                engine.register_targeted("tatoeba", "CC-BY 2.0 FR", Box::new(source))?;
            }
            let quota = limit.unwrap_or_else(|| engine.default_quota());
            let requests: HashMap<String, usize> =
                words.iter().map(|w| (w.clone(), quota)).collect();
            let results = engine.get_sentences_for_words(&requests, produce)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
                return Ok(());
            }
            for word in &words {
                let sentences = results.get(word).map_or(&[][..], Vec::as_slice);
                println!("{word} ({} of {quota}):", sentences.len());
                for sentence in sentences {
                    print_sentence(sentence);
                }
            }
            Ok(())
        }

        Command::Count {
            db,
            words,
            min_comprehension,
        } => {
            let engine = open_engine(&db, config)?;
            let counts = engine.count_occurrences(&words, min_comprehension)?;
            for word in &words {
                println!("{word}\t{}", counts.get(word).copied().unwrap_or(0));
            }
            Ok(())
        }

        Command::Bootstrap {
            db,
            pairs,
            source,
            license,
        } => {
            if !pairs.exists() {
                eprintln!("Pairs file does not exist: {}", pairs.display());
                std::process::exit(2);
            }
            let mut engine = open_engine(&db, config)?;
            engine.register_bulk(&source, &license, Box::new(PairsFileSource::new(&pairs)))?;
            let inserted = engine.bootstrap_if_empty()?;
            println!(
                "Bootstrapped {inserted} sentences ({} total)",
                engine.sentence_count()
            );
            Ok(())
        }

        Command::Known { db, words } => {
            let mut engine = open_engine(&db, config)?;
            let known: HashSet<String> = words.into_iter().collect();
            let count = known.len();
            engine.update_known(&known)?;
            println!("Marked {count} words known; comprehension counts refreshed");
            Ok(())
        }

        Command::Stats { db } => {
            let engine = open_engine(&db, config)?;
            println!("sentences: {}", engine.sentence_count());
            println!("sources:   {}", engine.ledger().entries().len());
            Ok(())
        }

        Command::Sources { db } => {
            let engine = open_engine(&db, config)?;
            for entry in engine.ledger().entries() {
                println!("{}\t{}\t{}", entry.tag, entry.name, entry.license);
            }
            Ok(())
        }
    }
}

fn open_engine(db: &Path, config: FileConfig) -> Result<CorpusEngine, Box<dyn std::error::Error>> {
    if !db.exists() {
        eprintln!("No corpus at {} (run `reibun init` first)", db.display());
        std::process::exit(2);
    }
    Ok(CorpusEngine::open(db, config, Box::new(SpaceSegmenter))?)
}

fn tatoeba_source(engine: &CorpusEngine) -> TatoebaSource {
    TatoebaSource::new(
        Duration::from_millis(engine.config().connect_timeout_ms),
        Duration::from_millis(engine.config().read_timeout_ms),
    )
}

fn print_sentence(sentence: &Sentence) {
    let difficulty = if sentence.total_words > 0 {
        sentence.unknown_words as f64 / sentence.total_words as f64
    } else {
        1.0
    };
    println!("  {}", sentence.text);
    println!("    {}", sentence.translation);
    let mut meta = format!("unknown {:.0}%", difficulty * 100.0);
    if sentence.trusted {
        meta.push_str(", trusted");
    }
    if let Some(credit) = &sentence.credit {
        meta.push_str(&format!(", {credit}"));
    }
    println!("    [{meta}]");
}
