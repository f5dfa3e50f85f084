use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::Path;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use xmlls_dom::{get_matching_tag_position, Document, DocumentMode, DomParser, NodeId, Position};
use xmlls_scanner::{Scanner, Token};

#[derive(Parser)]
#[command(name = "xmlls")]
#[command(about = "Inspect how the XML language server sees a document")]
#[command(version)]
struct Cli {
    /// Log parser activity to stderr (overrides RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the token stream of a file
    Tokens {
        #[command(flatten)]
        input: Input,

        /// Emit JSON instead of one token per line
        #[arg(long)]
        json: bool,
    },

    /// Print the node tree of a file
    Tree {
        #[command(flatten)]
        input: Input,

        /// Emit JSON instead of an indented outline
        #[arg(long)]
        json: bool,
    },

    /// Convert between a byte offset and a line/character position
    Position {
        /// Input file
        path: String,

        #[arg(long, conflicts_with_all = ["line", "character"])]
        offset: Option<usize>,

        #[arg(long, requires = "character")]
        line: Option<usize>,

        #[arg(long, requires = "line")]
        character: Option<usize>,
    },

    /// Find the position in the partner tag name of the element under the cursor
    MatchTag {
        /// Input file
        path: String,

        #[arg(long)]
        line: usize,

        #[arg(long)]
        character: usize,
    },
}

#[derive(Args)]
struct Input {
    /// Input file; .dtd, .ent and .mod files are read as DTDs
    path: String,

    /// Read the file as a DTD regardless of its extension
    #[arg(long)]
    dtd: bool,
}

impl Input {
    fn mode(&self) -> DocumentMode {
        if self.dtd {
            DocumentMode::Dtd
        } else {
            DocumentMode::from_uri(&self.path)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Tokens { input, json } => cmd_tokens(&input, json),
        Command::Tree { input, json } => cmd_tree(&input, json),
        Command::Position {
            path,
            offset,
            line,
            character,
        } => cmd_position(&path, offset, line.zip(character)),
        Command::MatchTag {
            path,
            line,
            character,
        } => cmd_match_tag(&path, Position::new(line, character)),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_source(path: &str) -> String {
    let p = Path::new(path);
    if !p.exists() {
        eprintln!("Error: file not found: {path}");
        std::process::exit(1);
    }
    match std::fs::read_to_string(p) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading {path}: {e}");
            std::process::exit(1);
        }
    }
}

fn parse_file(path: &str, mode: DocumentMode) -> Document {
    let source = read_source(path);
    DomParser::parse_with_mode(&source, path, mode)
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error encoding JSON: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_tokens(input: &Input, json: bool) {
    let source = read_source(&input.path);
    let mode = input.mode();
    let tokens = Scanner::tokenize(&source, mode.scanner_mode());
    debug!(path = %input.path, count = tokens.len(), "scanned");

    if json {
        print_json(&tokens);
        return;
    }
    for token in &tokens {
        println!("{}", format_token(token));
    }
}

fn format_token(token: &Token<'_>) -> String {
    format!(
        "{:>5}..{:<5} {:?} {:?}",
        token.span.start, token.span.end, token.kind, token.text
    )
}

/// Nested, serializable outline of a document.
#[derive(Debug, PartialEq, Serialize)]
struct TreeView {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    start: usize,
    end: usize,
    closed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<TreeView>,
}

impl TreeView {
    fn build(doc: &Document, id: NodeId) -> Self {
        let node = doc.node(id);
        Self {
            kind: kind_label(doc, id),
            name: node.name().map(str::to_string),
            start: node.start,
            end: node.end,
            closed: node.closed,
            children: doc
                .children(id)
                .iter()
                .map(|&child| Self::build(doc, child))
                .collect(),
        }
    }

    fn write_outline(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        let name = self.name.as_deref().map(|n| format!(" {n}")).unwrap_or_default();
        let open = if self.closed || depth == 0 { "" } else { " (unclosed)" };
        out.push_str(&format!(
            "{indent}{}{name} [{}, {}){open}\n",
            self.kind, self.start, self.end
        ));
        for child in &self.children {
            child.write_outline(depth + 1, out);
        }
    }
}

fn kind_label(doc: &Document, id: NodeId) -> &'static str {
    use xmlls_dom::NodeKind;
    let node = doc.node(id);
    match &node.kind {
        NodeKind::Document => "document",
        NodeKind::Element(_) => "element",
        NodeKind::Text => "text",
        NodeKind::Comment(_) => "comment",
        NodeKind::CData(_) => "cdata",
        NodeKind::ProcessingInstruction(pi) if pi.is_prolog => "prolog",
        NodeKind::ProcessingInstruction(_) => "pi",
        NodeKind::DocumentType(_) => "doctype",
        NodeKind::ElementDecl(_) => "element-decl",
        NodeKind::AttlistDecl(_) => "attlist-decl",
        NodeKind::EntityDecl(_) => "entity-decl",
    }
}

fn cmd_tree(input: &Input, json: bool) {
    let doc = parse_file(&input.path, input.mode());
    let view = TreeView::build(&doc, doc.root());

    if json {
        print_json(&view);
        return;
    }
    let mut out = String::new();
    view.write_outline(0, &mut out);
    print!("{out}");
}

fn cmd_position(path: &str, offset: Option<usize>, line_character: Option<(usize, usize)>) {
    let doc = parse_file(path, DocumentMode::from_uri(path));

    let result = match (offset, line_character) {
        (Some(offset), _) => doc
            .position_at(offset)
            .map(|position| format!("{}:{}", position.line, position.character)),
        (None, Some((line, character))) => doc
            .offset_at(Position::new(line, character))
            .map(|offset| offset.to_string()),
        (None, None) => {
            eprintln!("Error: pass --offset, or --line with --character");
            std::process::exit(1);
        }
    };

    match result {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_match_tag(path: &str, position: Position) {
    let doc = parse_file(path, DocumentMode::from_uri(path));

    match get_matching_tag_position(&doc, position) {
        Ok(Some(found)) => println!("{}:{}", found.line, found.character),
        Ok(None) => eprintln!("No matching tag at {}:{}", position.line, position.character),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
