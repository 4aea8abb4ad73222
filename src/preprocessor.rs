//! Conditional inclusion, macro substitution, and file inclusion over a
//! token stream, grounded in the source's `Preprocessor` class.
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::token::{tokenize_all, Token, TokenKind, TokenStream};

#[derive(Debug)]
pub enum Error {
    UnterminatedConditional,
    ElseWithoutIf,
    MissingIncludeFile(PathBuf),
    MalformedDirective(String, u32),
    Tokenize(crate::token::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnterminatedConditional => write!(f, "unterminated #ifdef/#ifndef"),
            Error::ElseWithoutIf => write!(f, "#else without a matching #ifdef/#ifndef"),
            Error::MissingIncludeFile(path) => write!(f, "could not read included file '{}'", path.display()),
            Error::MalformedDirective(text, line) => write!(f, "malformed directive '{text}' at line {line}"),
            Error::Tokenize(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::token::Error> for Error {
    fn from(e: crate::token::Error) -> Self {
        Error::Tokenize(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    IfBody,
    ElseBody,
}

#[derive(Debug, Clone, Copy)]
struct Scope {
    kind: ScopeKind,
    ignore: bool,
}

enum Directive {
    Define,
    Ifdef,
    Ifndef,
    Else,
    Endif,
    Include,
    None,
}

fn classify(text: &str) -> Directive {
    match text {
        "#define" => Directive::Define,
        "#ifdef" => Directive::Ifdef,
        "#ifndef" => Directive::Ifndef,
        "#else" => Directive::Else,
        "#endif" => Directive::Endif,
        "#include" => Directive::Include,
        _ => Directive::None,
    }
}

/// Runs the preprocessor over `stream`, splicing included files directly
/// into the stream's token vector and returning the filtered token sequence
/// with directives consumed, macros substituted, and newlines dropped.
pub struct Preprocessor {
    file_dir: PathBuf,
    definitions: HashMap<String, Token>,
    scopes: Vec<Scope>,
    output: Vec<Token>,
}

impl Preprocessor {
    pub fn new(file_dir: impl Into<PathBuf>) -> Self {
        Preprocessor { file_dir: file_dir.into(), definitions: HashMap::new(), scopes: Vec::new(), output: Vec::new() }
    }

    pub fn define(&mut self, name: impl Into<String>, value: Token) {
        self.definitions.insert(name.into(), value);
    }

    fn is_ignored(&self) -> bool {
        self.scopes.last().is_some_and(|s| s.ignore)
    }

    pub fn run(mut self, stream: &mut TokenStream) -> Result<Vec<Token>, Error> {
        while stream.has_more() {
            self.process_token(stream)?;
            stream.advance();
        }
        if !self.scopes.is_empty() {
            return Err(Error::UnterminatedConditional);
        }
        Ok(self.output)
    }

    fn process_token(&mut self, stream: &mut TokenStream) -> Result<(), Error> {
        let token = stream.current().clone();
        let directive = if token.kind == TokenKind::PreprocessorDirective { classify(&token.text) } else { Directive::None };

        match directive {
            Directive::Define => {
                if !self.is_ignored() {
                    stream.advance();
                    let name = stream.current().text.clone();
                    stream.advance();
                    let value = stream.current().clone();
                    self.define(name, value);
                }
            }
            Directive::Ifdef | Directive::Ifndef => {
                stream.advance();
                let name = stream.current().text.clone();
                let defined = self.definitions.contains_key(&name);
                let condition_false = defined == matches!(directive, Directive::Ifndef);
                let ignore = self.is_ignored() || condition_false;
                self.scopes.push(Scope { kind: ScopeKind::IfBody, ignore });
            }
            Directive::Else => {
                let mut scope = self.scopes.pop().ok_or(Error::ElseWithoutIf)?;
                let parent_ignores = self.is_ignored();
                scope.kind = ScopeKind::ElseBody;
                scope.ignore = parent_ignores || !scope.ignore;
                self.scopes.push(scope);
            }
            Directive::Endif => {
                self.scopes.pop().ok_or(Error::ElseWithoutIf)?;
            }
            Directive::Include => {
                if !self.is_ignored() {
                    stream.advance();
                    let raw = stream.current().text.clone();
                    let inner = raw.trim_matches('"');
                    let path = self.file_dir.join(inner);
                    let contents = std::fs::read_to_string(&path).map_err(|_| Error::MissingIncludeFile(path.clone()))?;
                    let new_tokens: Vec<Token> =
                        tokenize_all(&contents)?.into_iter().filter(|t| t.kind != TokenKind::EndOfFile).collect();
                    let insertion_point = stream.current_index() + 1;
                    stream.tokens_mut().splice(insertion_point..insertion_point, new_tokens);
                }
            }
            Directive::None => {
                if !self.is_ignored() {
                    let mut out_token = token.clone();
                    if out_token.kind == TokenKind::Identifier {
                        if let Some(def) = self.definitions.get(&out_token.text) {
                            out_token = def.clone();
                        }
                    }
                    if out_token.kind != TokenKind::Newline {
                        self.output.push(out_token);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Convenience entry point used by the driver: tokenizes, preprocesses, and
/// returns the filtered token sequence ready for the parser.
pub fn preprocess_source(src: &str, file_dir: &Path) -> Result<Vec<Token>, Error> {
    let tokens = tokenize_all(src)?;
    let mut stream = TokenStream::new(tokens);
    Preprocessor::new(file_dir).run(&mut stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ifdef_without_definition_takes_the_else_branch() {
        let src = "#ifdef FOO\nuint8_t a;\n#else\nuint8_t b;\n#endif\n";
        let tokens = preprocess_source(src, Path::new(".")).unwrap();
        let idents: Vec<&str> = tokens.iter().filter(|t| t.kind == TokenKind::Identifier).map(|t| t.text.as_str()).collect();
        assert_eq!(idents, vec!["uint8_t", "b"]);
    }

    #[test]
    fn define_substitutes_identifier_occurrences() {
        let src = "#define WIDTH 10\nuint8_t w = WIDTH;\n";
        let tokens = preprocess_source(src, Path::new(".")).unwrap();
        let has_literal_ten = tokens.iter().any(|t| t.kind == TokenKind::IntLit && t.int_value == 10);
        assert!(has_literal_ten);
    }

    #[test]
    fn unterminated_conditional_is_an_error() {
        let src = "#ifdef FOO\nuint8_t a;\n";
        assert!(preprocess_source(src, Path::new(".")).is_err());
    }

    #[test]
    fn newlines_are_dropped_from_the_output() {
        let tokens = preprocess_source("a\nb\n", Path::new(".")).unwrap();
        assert!(tokens.iter().all(|t| t.kind != TokenKind::Newline));
    }
}
