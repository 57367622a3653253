//! Search path template DSL
//!
//! Upstream definitions template their search paths with a tiny language:
//! literal text, `{{ .Keywords }}`, `{{ .Query.IMDBID }}`,
//! `{{ .Query.Page }}`, and `{{if <var>}}a{{else}}b{{end}}`. Paths are
//! parsed into an AST once and rendered per query. An unsupported
//! construct is a parse error — the caller marks the path unusable instead
//! of ever emitting a malformed URL.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("unsupported template construct: {0}")]
    Unsupported(String),
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),
    #[error("{{{{else}}}} or {{{{end}}}} without an open {{{{if}}}}")]
    DanglingBranch,
    #[error("{{{{if}}}} without a matching {{{{end}}}}")]
    MissingEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Var {
    Keywords,
    ImdbId,
    Page,
}

impl Var {
    fn parse(name: &str) -> Option<Self> {
        match name {
            ".Keywords" => Some(Self::Keywords),
            ".Query.IMDBID" => Some(Self::ImdbId),
            ".Query.Page" => Some(Self::Page),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Var(Var),
    If {
        cond: Var,
        then: Vec<Segment>,
        otherwise: Vec<Segment>,
    },
}

/// Inputs substituted at render time.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    pub keywords: String,
    pub imdb_id: Option<String>,
    pub page: u32,
}

impl TemplateVars {
    fn value(&self, var: Var) -> String {
        match var {
            Var::Keywords => urlencoding::encode(&self.keywords).into_owned(),
            Var::ImdbId => self.imdb_id.clone().unwrap_or_default(),
            Var::Page => self.page.to_string(),
        }
    }

    fn truthy(&self, var: Var) -> bool {
        match var {
            Var::Keywords => !self.keywords.is_empty(),
            Var::ImdbId => self.imdb_id.as_deref().map(|s| !s.is_empty()).unwrap_or(false),
            Var::Page => self.page > 0,
        }
    }
}

/// A parsed search path template.
#[derive(Debug, Clone, PartialEq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(input: &str) -> Result<Self, TemplateError> {
        let mut parser = Parser {
            input,
            position: 0,
        };
        let (segments, stop) = parser.parse_until(false)?;
        match stop {
            Stop::Eof => Ok(Self { segments }),
            _ => Err(TemplateError::DanglingBranch),
        }
    }

    pub fn render(&self, vars: &TemplateVars) -> String {
        let mut out = String::new();
        render_segments(&self.segments, vars, &mut out);
        out
    }
}

fn render_segments(segments: &[Segment], vars: &TemplateVars, out: &mut String) {
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Var(var) => out.push_str(&vars.value(*var)),
            Segment::If {
                cond,
                then,
                otherwise,
            } => {
                if vars.truthy(*cond) {
                    render_segments(then, vars, out);
                } else {
                    render_segments(otherwise, vars, out);
                }
            }
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    position: usize,
}

enum Stop {
    End,
    Else,
    Eof,
}

impl<'a> Parser<'a> {
    /// Parse until EOF, or until `{{else}}`/`{{end}}` when inside an if.
    fn parse_until(&mut self, inside_if: bool) -> Result<(Vec<Segment>, Stop), TemplateError> {
        let mut segments = Vec::new();
        loop {
            let rest = &self.input[self.position..];
            if rest.is_empty() {
                return Ok((segments, Stop::Eof));
            }
            match rest.find("{{") {
                None => {
                    segments.push(Segment::Literal(rest.to_string()));
                    self.position = self.input.len();
                }
                Some(offset) => {
                    if offset > 0 {
                        segments.push(Segment::Literal(rest[..offset].to_string()));
                        self.position += offset;
                    }
                    let token = self.read_token()?;
                    match token.as_str() {
                        "else" => {
                            if !inside_if {
                                return Err(TemplateError::DanglingBranch);
                            }
                            return Ok((segments, Stop::Else));
                        }
                        "end" => {
                            if !inside_if {
                                return Err(TemplateError::DanglingBranch);
                            }
                            return Ok((segments, Stop::End));
                        }
                        token if token.starts_with("if ") => {
                            segments.push(self.parse_if(token)?);
                        }
                        token => match Var::parse(token) {
                            Some(var) => segments.push(Segment::Var(var)),
                            None => {
                                return Err(TemplateError::Unsupported(token.to_string()))
                            }
                        },
                    }
                }
            }
        }
    }

    /// Consume `{{ ... }}` at the current position, returning the trimmed
    /// inner token.
    fn read_token(&mut self) -> Result<String, TemplateError> {
        let start = self.position;
        let rest = &self.input[start + 2..];
        let close = rest
            .find("}}")
            .ok_or(TemplateError::Unterminated(start))?;
        let token = rest[..close].trim().to_string();
        self.position = start + 2 + close + 2;
        Ok(token)
    }

    fn parse_if(&mut self, token: &str) -> Result<Segment, TemplateError> {
        let cond_name = token["if ".len()..].trim();
        let cond = Var::parse(cond_name)
            .ok_or_else(|| TemplateError::Unsupported(format!("if {}", cond_name)))?;

        let (then, stop) = self.parse_until(true)?;
        let otherwise = match stop {
            Stop::Else => {
                let (otherwise, stop) = self.parse_until(true)?;
                match stop {
                    Stop::End => otherwise,
                    Stop::Else => return Err(TemplateError::DanglingBranch),
                    Stop::Eof => return Err(TemplateError::MissingEnd),
                }
            }
            Stop::End => Vec::new(),
            Stop::Eof => return Err(TemplateError::MissingEnd),
        };
        Ok(Segment::If {
            cond,
            then,
            otherwise,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(keywords: &str, imdb: Option<&str>, page: u32) -> TemplateVars {
        TemplateVars {
            keywords: keywords.to_string(),
            imdb_id: imdb.map(String::from),
            page,
        }
    }

    #[test]
    fn renders_simple_substitution() {
        let template = PathTemplate::parse("/search/{{ .Keywords }}/page/{{ .Query.Page }}").unwrap();
        assert_eq!(
            template.render(&vars("one fast move", None, 1)),
            "/search/one%20fast%20move/page/1"
        );
    }

    #[test]
    fn keywords_are_url_encoded() {
        let template = PathTemplate::parse("/q={{.Keywords}}").unwrap();
        assert_eq!(
            template.render(&vars("a&b c", None, 1)),
            "/q=a%26b%20c"
        );
    }

    #[test]
    fn if_else_branches_on_imdb_presence() {
        let template = PathTemplate::parse(
            "/api?{{if .Query.IMDBID}}imdb={{.Query.IMDBID}}{{else}}q={{.Keywords}}{{end}}",
        )
        .unwrap();
        assert_eq!(
            template.render(&vars("dune", Some("tt1160419"), 1)),
            "/api?imdb=tt1160419"
        );
        assert_eq!(template.render(&vars("dune", None, 1)), "/api?q=dune");
    }

    #[test]
    fn if_without_else() {
        let template =
            PathTemplate::parse("/browse{{if .Keywords}}/search/{{.Keywords}}{{end}}").unwrap();
        assert_eq!(template.render(&vars("dune", None, 1)), "/browse/search/dune");
        assert_eq!(template.render(&vars("", None, 1)), "/browse");
    }

    #[test]
    fn unsupported_constructs_fail_parse() {
        assert_eq!(
            PathTemplate::parse("/x/{{ .Categories }}"),
            Err(TemplateError::Unsupported(".Categories".to_string()))
        );
        assert!(matches!(
            PathTemplate::parse("/x/{{ range .Items }}{{ end }}"),
            Err(TemplateError::Unsupported(_))
        ));
    }

    #[test]
    fn structural_errors_fail_parse() {
        assert_eq!(
            PathTemplate::parse("/x/{{ .Keywords"),
            Err(TemplateError::Unterminated(3))
        );
        assert_eq!(
            PathTemplate::parse("/x{{end}}"),
            Err(TemplateError::DanglingBranch)
        );
        assert_eq!(
            PathTemplate::parse("{{if .Keywords}}a"),
            Err(TemplateError::MissingEnd)
        );
    }

    #[test]
    fn literal_only_template() {
        let template = PathTemplate::parse("/rss/latest").unwrap();
        assert_eq!(template.render(&vars("", None, 0)), "/rss/latest");
    }
}
