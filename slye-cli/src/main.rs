use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use slye_common::id::{IdGenerator, PresentationId};
use slye_runtime::decode::decode;
use slye_runtime::module::Headless;
use slye_runtime::update::{lock_graph, shared_graph};
use slye_scenegraph::document::{Document, DocumentPropValue, DocumentRef};
use slye_scenegraph::encode::encode;
use slye_scenegraph::scene_graph::SceneGraph;

/// Slye CLI for inspecting presentation documents
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the steps and components of a presentation document
    Inspect {
        /// Path to the presentation document (.json)
        file_path: String,
    },

    /// Decode a presentation document and encode it again
    Roundtrip {
        /// Path to the presentation document (.json)
        file_path: String,

        /// Output path (defaults to printing to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn read_document(path: &Path) -> Result<Document> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Document::from_json(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Decode without rendering and encode the result again.
async fn roundtrip(document: &Document) -> Result<Document> {
    let presentation = PresentationId::from("cli");
    let graph = shared_graph(SceneGraph::headless());
    let mut ids = IdGenerator::new();
    decode(&graph, &presentation, document, &Headless, &Headless, &mut ids).await?;
    let encoded = encode(&lock_graph(&graph), &presentation)?;
    Ok(encoded)
}

fn describe_prop(value: &DocumentPropValue) -> String {
    match value {
        DocumentPropValue::Bool(v) => v.to_string(),
        DocumentPropValue::Number(v) => v.to_string(),
        DocumentPropValue::String(v) => format!("{v:?}"),
        DocumentPropValue::Ref(DocumentRef::Font { font, module_name }) => {
            format!("font {module_name}/{font}")
        }
        DocumentPropValue::Ref(DocumentRef::File { uuid, module_id }) => match module_id {
            Some(module) => format!("file {module}/{uuid}"),
            None => format!("file {uuid}"),
        },
    }
}

fn inspect(document: &Document) {
    if let Some(template) = &document.template {
        println!("template: {}/{}", template.module_name, template.component);
    }
    for (index, (uuid, step)) in document.steps.iter().enumerate() {
        let [x, y, z] = step.position.to_array();
        println!("step {index} {uuid} at ({x}, {y}, {z})");
        for component in &step.components {
            println!(
                "  {} {}/{}",
                component.uuid, component.module_name, component.component
            );
            for (key, value) in &component.props {
                println!("    {key}: {}", describe_prop(value));
            }
        }
    }
    println!(
        "{} steps, {} components",
        document.steps.len(),
        document.num_components()
    );
}

fn main() -> Result<()> {
    // Setup logger
    env_logger::init();

    let cli = Cli::parse();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;

    match cli.command {
        Commands::Inspect { file_path } => {
            let document = read_document(&PathBuf::from(file_path))?;
            // Decoding validates the document before anything is printed
            rt.block_on(roundtrip(&document))?;
            inspect(&document);
            Ok(())
        }
        Commands::Roundtrip { file_path, output } => {
            let document = read_document(&PathBuf::from(&file_path))?;
            let encoded = rt.block_on(roundtrip(&document))?;
            if encoded != document {
                log::warn!("{file_path} changed while round tripping");
            }
            let json = encoded.to_json_pretty()?;
            match output {
                Some(output) => {
                    fs::write(&output, json)
                        .with_context(|| format!("Failed to write {output}"))?;
                    info!("Saved presentation to {output}");
                }
                None => println!("{json}"),
            }
            Ok(())
        }
    }
}
