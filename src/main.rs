mod cli;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use console::style;
use tracing_subscriber::fmt::time;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};
use tree_sitter::Parser as TsParser;

use cli::Cli;
use dvfs_cfg_analyzer::config::AnalyzerConfig;
use dvfs_cfg_analyzer::errors::{AnalyzerError, AnalyzerResult};
use dvfs_cfg_analyzer::{asmcost, builder, dvfs, graphml, wcec, AnalyzerSession};

fn init_tracing() {
    let fmt_layer = fmt::layer()
        .pretty()
        .with_thread_ids(true)
        .with_timer(time::UtcTime::rfc_3339());

    Registry::default()
        .with(EnvFilter::from_default_env())
        .with(fmt_layer)
        .init();
}

fn main() -> AnalyzerResult<()> {
    let now = Instant::now();
    init_tracing();

    tracing::debug!("dvfs-cfg-analyzer starting up");
    let cli = Cli::parse();
    let config = AnalyzerConfig::load(cli.config.as_deref())?;

    run(&cli, &config)?;

    println!(
        "{} in {:.3}s.",
        style("Finished").green().bold(),
        now.elapsed().as_secs_f32()
    );
    Ok(())
}

fn run(cli: &Cli, config: &AnalyzerConfig) -> AnalyzerResult<()> {
    let source = fs::read_to_string(&cli.input)?;

    tracing::debug!(path = %cli.input.display(), "parsing C source");
    let mut parser = TsParser::new();
    parser
        .set_language(&tree_sitter::Language::from(tree_sitter_c::LANGUAGE))
        .map_err(|e| AnalyzerError::from(format!("tree-sitter setup failed: {e}")))?;
    let tree = parser
        .parse(&source, None)
        .ok_or_else(|| AnalyzerError::from("tree-sitter failed to produce a parse tree"))?;

    let mut session = AnalyzerSession::new();
    builder::build_from_source(&mut session, &tree, source.as_bytes());
    tracing::debug!(nodes = session.node_count(), "CFG built");

    tracing::debug!(
        compiler = %config.cross_compiler,
        "invoking cross-compiler for annotated assembly"
    );
    let asm = asmcost::generate_assembly(&config.cross_compiler, &config.cross_compiler_args, &cli.input)?;
    let cline_table = asmcost::parse_asm_instructions(&asm);

    let instr_table = match &config.instr_cycle_table_path {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            asmcost::load_instr_cycle_table(&text)?
        }
        None => asmcost::load_instr_cycle_table(dvfs_cfg_analyzer::DEFAULT_INSTR_CYCLES)?,
    };

    wcec::compute_cfg_wcec(&mut session, &source, &instr_table, cline_table)?;
    tracing::debug!("WCEC/RWCEC propagation complete");

    if let Some(path) = &cli.graphml {
        let xml = graphml::write_graphml(&session);
        fs::write(path, xml)?;
        tracing::debug!(path = %path.display(), "wrote GraphML dump");
    }

    if cli.dump_cfg {
        println!("{}", session.show());
        return Ok(());
    }

    let rewritten = dvfs::generate_dvfs_source(&session, &source)?;

    match output_path(cli) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "writing DVFS-aware source");
            fs::write(&path, &rewritten)?;
            if let Some(dir) = path.parent() {
                fs::write(dir.join("cfg_wcec.h"), dvfs::HEADER_SOURCE)?;
            }
        }
        None => print!("{rewritten}"),
    }

    Ok(())
}

/// `None` means stdout: an empty output name means write to standard
/// output. An explicit `--output ""` requests stdout; with no flag at
/// all, default to `<stem>_dvfs.c` next to the input.
fn output_path(cli: &Cli) -> Option<PathBuf> {
    match &cli.output {
        Some(s) if s.is_empty() => None,
        Some(s) => Some(PathBuf::from(s)),
        None => {
            let stem = cli.input.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
            let dir = cli.input.parent().unwrap_or_else(|| Path::new("."));
            Some(dir.join(format!("{stem}_dvfs.c")))
        }
    }
}
