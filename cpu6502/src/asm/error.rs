use thiserror::Error;

/// The source location an assembler diagnostic points at: which file,
/// which line/column, and the exact text that triggered the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceToken {
    /// `None` for sources assembled from a string rather than a file
    /// (`Compiler::compile_str` on an in-memory fixture, for instance).
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
    pub lexeme: String,
}

impl SourceToken {
    pub fn new(file: Option<&str>, line: u32, column: u32, lexeme: &str) -> SourceToken {
        SourceToken {
            file: file.map(|f| f.to_string()),
            line,
            column,
            lexeme: lexeme.to_string(),
        }
    }
}

impl std::fmt::Display for SourceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{} (near \"{}\")", file, self.line, self.column, self.lexeme),
            None => write!(f, "{}:{} (near \"{}\")", self.line, self.column, self.lexeme),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("unknown mnemonic at {0}")]
    UnknownMnemonic(SourceToken),

    #[error("invalid operand argument at {0}")]
    InvalidOperandArgument(SourceToken),

    #[error("operand does not fit the selected addressing mode's width at {0}")]
    InvalidOperandSize(SourceToken),

    #[error("no addressing mode of this mnemonic accepts this operand shape at {0}")]
    OperandModeNotSupported(SourceToken),

    #[error("symbol \"{symbol}\" was never defined, referenced at {token}")]
    UnresolvedSymbol { symbol: String, token: SourceToken },

    #[error("label \"{name}\" is defined more than once, redefined at {token}")]
    DuplicateLabel { name: String, token: SourceToken },

    #[error("relocation for \"{symbol}\" does not fit its target width at {token}")]
    RelocationOutOfRange { symbol: String, token: SourceToken },

    #[error("emission at {address:#06x} overlaps bytes already written, at {token}")]
    OverlappingEmission { address: u16, token: SourceToken },

    #[error("malformed token at {0}")]
    MalformedToken(SourceToken),
}

impl AssemblerError {
    /// A `colored`-highlighted rendering of the error against the
    /// offending line, in the spirit of a compiler's caret diagnostic.
    pub fn render(&self, source: &str) -> String {
        use colored::*;

        let token = self.token();
        let mut rendered = String::new();
        if let Some(line_text) = source.lines().nth(token.line.saturating_sub(1) as usize) {
            rendered.push_str(&format!("{:>4} | {}\n", token.line, line_text));
            let caret_indent = " ".repeat(4 + 3 + token.column.saturating_sub(1) as usize);
            rendered.push_str(&format!("{}{}\n", caret_indent, "^".bright_red()));
        }
        rendered.push_str(&format!("{}", self.to_string().bright_red()));
        rendered
    }

    fn token(&self) -> &SourceToken {
        match self {
            AssemblerError::UnknownMnemonic(t)
            | AssemblerError::InvalidOperandArgument(t)
            | AssemblerError::InvalidOperandSize(t)
            | AssemblerError::OperandModeNotSupported(t)
            | AssemblerError::MalformedToken(t) => t,
            AssemblerError::UnresolvedSymbol { token, .. }
            | AssemblerError::DuplicateLabel { token, .. }
            | AssemblerError::RelocationOutOfRange { token, .. }
            | AssemblerError::OverlappingEmission { token, .. } => token,
        }
    }
}
