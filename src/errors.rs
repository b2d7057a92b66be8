use thiserror::Error;

pub type AnalyzerResult<T, E = AnalyzerError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("unable to produce assembler code: {0}")]
    CrossCompiler(String),

    #[error("unknown instruction mnemonic in cost table lookup: {0}")]
    UnknownMnemonic(String),

    #[error("nested loops are not supported by the DVFS code generator (function {0})")]
    NestedLoopUnsupported(String),

    #[error("source file is empty, nothing to synthesize")]
    EmptySource,

    #[error("{0}")]
    Msg(String),
}

impl From<&str> for AnalyzerError {
    fn from(s: &str) -> Self {
        AnalyzerError::Msg(s.to_owned())
    }
}

impl From<String> for AnalyzerError {
    fn from(s: String) -> Self {
        AnalyzerError::Msg(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_conversion_retains_message() {
        let e = std::io::Error::new(std::io::ErrorKind::Other, "boom!");
        let n: AnalyzerError = e.into();
        assert!(matches!(n, AnalyzerError::Io(_)));
        assert!(n.to_string().contains("boom"));
    }

    #[test]
    fn simple_string_into_msg() {
        let n: AnalyzerError = "plain msg".into();
        assert!(matches!(n, AnalyzerError::Msg(s) if s == "plain msg"));
    }
}
