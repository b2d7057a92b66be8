//! Cross-compiler invocation and the `.loc`-annotated assembly parser that
//! maps every C source line to the list of instructions it compiled down to.
//!
//! Shells out to a cross-compiler for `-S -g` assembly, then runs a tiny
//! 4-state automaton over the listing keyed on three regexes (function
//! label, `.loc` directive, plain instruction line).

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{AnalyzerError, AnalyzerResult};

/// `{function_name: {c_line: [mnemonic, ...]}}`.
pub type ClineInstrTable = HashMap<String, HashMap<usize, Vec<String>>>;

/// `{mnemonic: cycles}`.
pub type InstrCycleTable = HashMap<String, u64>;

static FUNC_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+):\s*").unwrap());
static LOC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\.loc\b\s+\d+\s+(\d+)\s+").unwrap());
static INSTR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s+(\w+)[^.]*(\.\w+)?.*").unwrap());

/// Parse a plain-text `mnemonic cycles` table (one pair per line, blank
/// lines and `#`-led comments ignored). Callers load the bundled default or
/// a user-supplied override via `config::AnalyzerConfig`.
pub fn load_instr_cycle_table(text: &str) -> AnalyzerResult<InstrCycleTable> {
    let mut table = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let instr = parts
            .next()
            .ok_or_else(|| AnalyzerError::from(format!("malformed cost table line: {line:?}")))?
            .to_lowercase();
        let cycles: u64 = parts
            .next()
            .ok_or_else(|| AnalyzerError::from(format!("malformed cost table line: {line:?}")))?
            .parse()
            .map_err(|_| AnalyzerError::from(format!("malformed cost table line: {line:?}")))?;
        table.insert(instr, cycles);
    }
    Ok(table)
}

/// Invoke the configured cross-compiler on `cfile`, asking for annotated
/// assembly on stdout.
pub fn generate_assembly(compiler: &str, extra_args: &[String], cfile: &Path) -> AnalyzerResult<String> {
    let mut cmd = Command::new(compiler);
    cmd.args(extra_args)
        .args(["-g", "-S", "-o", "/dev/stdout"])
        .arg(cfile);

    let output = cmd
        .output()
        .map_err(|e| AnalyzerError::CrossCompiler(format!("{compiler}: {e}")))?;

    if !output.status.success() {
        return Err(AnalyzerError::CrossCompiler(format!(
            "{compiler} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run the 4-state automaton over an assembly listing and build
/// `{function: {line: [mnemonics]}}`.
pub fn parse_asm_instructions(asm: &str) -> ClineInstrTable {
    enum State {
        Init,
        FuncName,
        NewLoc,
        AddInstr,
    }

    let mut state = State::Init;
    let mut cline = 0usize;
    let mut func_name: Option<String> = None;
    let mut table: ClineInstrTable = HashMap::new();

    for line in asm.lines() {
        let mut data: Option<String> = None;

        if let Some(caps) = FUNC_NAME.captures(line) {
            func_name = Some(caps[1].to_owned());
            state = State::FuncName;
        } else if let Some(caps) = LOC.captures(line) {
            cline = caps[1].parse().unwrap_or(0);
            state = State::NewLoc;
        } else if let Some(caps) = INSTR.captures(line) {
            data = Some(caps[1].to_owned());
            state = State::AddInstr;
        } else {
            continue;
        }

        match state {
            State::FuncName => {
                if let Some(name) = &func_name {
                    table.entry(name.clone()).or_default();
                }
            }
            State::NewLoc => {
                if let Some(name) = &func_name {
                    table.entry(name.clone()).or_default().entry(cline).or_default();
                }
            }
            State::AddInstr => {
                if let (Some(name), Some(instr)) = (&func_name, data) {
                    table
                        .entry(name.clone())
                        .or_default()
                        .entry(cline)
                        .or_default()
                        .push(instr);
                }
            }
            State::Init => {}
        }
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_simple_cost_table() {
        let table = load_instr_cycle_table("mov 1\nldr 3\n# comment\n\nadd 1\n").unwrap();
        assert_eq!(table.get("mov"), Some(&1));
        assert_eq!(table.get("ldr"), Some(&3));
        assert_eq!(table.get("add"), Some(&1));
    }

    #[test]
    fn parses_function_loc_and_instructions() {
        let asm = "\
f:
\t.loc 1 4 0
\tmov r0, #1
\tadd r0, r0, #1
\t.loc 1 5 0
\tbx lr
";
        let table = parse_asm_instructions(asm);
        let f = table.get("f").expect("function f present");
        assert_eq!(f.get(&4).unwrap(), &vec!["mov".to_string(), "add".to_string()]);
        assert_eq!(f.get(&5).unwrap(), &vec!["bx".to_string()]);
    }
}
