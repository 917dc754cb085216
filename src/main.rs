use std::path::PathBuf;

use clap::{Parser, Subcommand};
use retext_pdf::{EngineConfig, FontCatalog, OverlayEdit, Rect, SourceRun};
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "retext-pdf", version, about = "Replace text in existing PDF pages")]
struct Args {
    /// Extra font directory, searched before the system ones
    #[arg(long = "font-dir", global = true)]
    font_dirs: Vec<PathBuf>,

    /// Rescan font directories instead of reading the index cache
    #[arg(long, global = true)]
    no_font_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show which local file each font name resolves to
    Resolve { names: Vec<String> },
    /// Apply a JSON edit script to a PDF
    Apply {
        input: PathBuf,
        edits: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Also write a session archive
        #[arg(long)]
        session: Option<PathBuf>,
    },
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ScriptEdit {
    Replace {
        page: usize,
        run: SourceRun,
        #[serde(default)]
        edit: OverlayEdit,
    },
    Insert {
        page: usize,
        bbox: Rect,
        text: String,
        font: String,
        size: f32,
        #[serde(default)]
        edit: OverlayEdit,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = EngineConfig::from_env();
    if !args.font_dirs.is_empty() {
        let mut dirs = args.font_dirs.clone();
        dirs.append(&mut config.font_dirs);
        config.font_dirs = dirs;
    }
    if args.no_font_cache {
        config.use_font_cache = false;
    }
    let catalog = FontCatalog::scan(&config);

    match args.command {
        Command::Resolve { names } => {
            for name in &names {
                match catalog.resolve(name) {
                    Ok(rec) => println!(
                        "{} -> {} #{} ({:?}, {})",
                        name,
                        rec.path.display(),
                        rec.face_index,
                        rec.step,
                        rec.family
                    ),
                    Err(e) => println!("{} -> {}", name, e),
                }
            }
        }
        Command::Apply {
            input,
            edits,
            output,
            session,
        } => {
            let script: Vec<ScriptEdit> = serde_json::from_slice(&std::fs::read(&edits)?)?;
            let mut editor = retext_pdf::EditSession::open(&input, &catalog, &config)?;
            for item in script {
                match item {
                    ScriptEdit::Replace { page, run, edit } => {
                        editor.edit_text_run(page, &run, edit)?;
                    }
                    ScriptEdit::Insert {
                        page,
                        bbox,
                        text,
                        font,
                        size,
                        edit,
                    } => {
                        editor.add_text_region(page, bbox, &text, &font, size, edit)?;
                    }
                }
            }
            let report = editor.save(&output, &mut |p| {
                log::debug!("{:?} page {} ({}/{})", p.pass, p.page + 1, p.done, p.total);
            })?;
            for o in &report.overlays {
                println!("overlay {} page {}: {:?}", o.z_index, o.page + 1, o.method);
            }
            if let Some(path) = session {
                editor.save_session(&path)?;
            }
            println!("Saved to: {}", output.display());
        }
    }
    Ok(())
}
