/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The export-definition language: an Abaqus-flavoured keyword file that
//! declares which results are exported, on which sets, and how.
//!
//! A definition file consists of keyword lines `*keyword, opt=value, ...`,
//! comment lines starting with `**`, and bare data lines that attach to the
//! entry opened by the preceding keyword line. All recognized keywords and
//! their options are listed in [`KEYWORDS`]; anything else is rejected
//! before any input or output file is touched.

mod expr;

pub use expr::{Expr, ExprError};

use std::fmt::Write as _;
use std::path::Path;

use indexmap::IndexMap;
use thiserror::Error;

/// Errors raised while reading or interpreting an export definition. All of
/// them are fatal before any I/O on results or case files happens.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid keyword *{keyword}")]
    UnknownKeyword { keyword: String },
    #[error("'{option}' is not a valid option for keyword *{keyword}")]
    UnknownOption { keyword: String, option: String },
    #[error("'{value}' is not a valid {expected} for option {option} of keyword *{keyword}")]
    InvalidValue {
        keyword: String,
        option: String,
        value: String,
        expected: &'static str,
    },
    #[error("keyword *{keyword} requires option {option}")]
    MissingOption {
        keyword: &'static str,
        option: &'static str,
    },
    #[error("entry for unknown job '{job}'")]
    UnknownJob { job: String },
    #[error("set type must be 'elSet' or 'nSet', not '{value}'")]
    InvalidSetType { value: String },
    #[error("'{value}' is not a valid index or slice")]
    InvalidSlice { value: String },
    #[error("invalid expression '{expr}': {source}")]
    InvalidExpression { expr: String, source: ExprError },
    #[error("job '{job}': dimensions must be 1, 3, 6 or 9, not {dimensions}")]
    InvalidDimensions { job: String, dimensions: i64 },
    #[error("job '{job}': which must be a quadrature point number for location=qps, not '{value}'")]
    InvalidWhich { job: String, value: String },
    #[error("cannot read {path}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Declared type of a keyword option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    Int,
    Float,
    Str,
}

impl OptionType {
    fn name(self) -> &'static str {
        match self {
            OptionType::Int => "integer",
            OptionType::Float => "float",
            OptionType::Str => "string",
        }
    }
}

/// A typed option value, converted at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Int(i64),
    Float(f64),
    Str(String),
}

/// Schema of one keyword: its options with type and documentation.
pub struct KeywordSpec {
    pub name: &'static str,
    pub doc: &'static str,
    pub options: &'static [(&'static str, OptionType, &'static str)],
}

/// The export-definition language.
pub const KEYWORDS: &[KeywordSpec] = &[
    KeywordSpec {
        name: "*defineElementType",
        doc: "assign an Ensight cell shape to a solver element type",
        options: &[
            ("element", OptionType::Str, "solver (user) element type"),
            (
                "shape",
                OptionType::Str,
                "Ensight shape, any of: point bar2 bar3 tria3 tria6 quad4 quad8 tetra4 tetra10 \
                 pyramid5 pyramid13 penta6 penta15 hexa8 hexa20 nsided nfaced",
            ),
        ],
    },
    KeywordSpec {
        name: "*ignoreLastNodesForElementType",
        doc: "ignore trailing nodes of an element type (e.g. project a hexa27 onto a hexa20 with number=7)",
        options: &[
            ("element", OptionType::Str, "solver (user) element type"),
            ("number", OptionType::Int, "the number of trailing nodes to ignore"),
        ],
    },
    KeywordSpec {
        name: "*substituteElSet",
        doc: "define an element set from literal data lines of element labels",
        options: &[("elSet", OptionType::Str, "name of the substitute element set")],
    },
    KeywordSpec {
        name: "*UELSDVToQuadraturePoints",
        doc: "unpack a UEL SDV vector into per-quadrature-point results",
        options: &[
            ("set", OptionType::Str, "solver element set"),
            ("destination", OptionType::Str, "new name of the result"),
            ("qpCount", OptionType::Int, "number of quadrature points to extract"),
            ("qpDistance", OptionType::Int, "data distance between quadrature points"),
            (
                "qpInitialOffset",
                OptionType::Int,
                "constant offset before the quadrature point data begins",
            ),
        ],
    },
    KeywordSpec {
        name: "*computeAverageOverQuadraturePoints",
        doc: "compute the average of an elemental result over its quadrature points",
        options: &[
            ("set", OptionType::Str, "solver element set"),
            ("result", OptionType::Str, "result identifier"),
        ],
    },
    KeywordSpec {
        name: "*ensightPerNodeVariableJob",
        doc: "define an Ensight per-node variable for export",
        options: &[
            ("name", OptionType::Str, "export name of the variable"),
            (
                "dimensions",
                OptionType::Int,
                "1/3/6/9 for scalar/vector/tensor/tensor9; missing components are zero filled",
            ),
            ("timeSet", OptionType::Int, "(optional) time set for a separate timeline"),
        ],
    },
    KeywordSpec {
        name: "*ensightPerNodeVariableJobEntry",
        doc: "add one set to a per-node variable job",
        options: &[
            ("job", OptionType::Str, "the associated export job"),
            ("setType", OptionType::Str, "elSet or nSet, default elSet"),
            ("set", OptionType::Str, "set name"),
            ("result", OptionType::Str, "result identifier"),
            (
                "values",
                OptionType::Str,
                "(optional) index 'i' or slice 'a:b' extracting a subarray per node",
            ),
            (
                "f(x)",
                OptionType::Str,
                "(optional) expression applied to the result array per node",
            ),
            (
                "fillMissingValuesTo",
                OptionType::Float,
                "(optional) pad short vectors and substitute missing nodal results",
            ),
        ],
    },
    KeywordSpec {
        name: "*ensightPerElementVariableJob",
        doc: "define an Ensight per-element variable for export",
        options: &[
            ("name", OptionType::Str, "export name of the variable"),
            (
                "dimensions",
                OptionType::Int,
                "1/3/6/9 for scalar/vector/tensor/tensor9; missing components are zero filled",
            ),
            ("timeSet", OptionType::Int, "(optional) time set for a separate timeline"),
        ],
    },
    KeywordSpec {
        name: "*ensightPerElementVariableJobEntry",
        doc: "add one element set to a per-element variable job",
        options: &[
            ("job", OptionType::Str, "the associated export job"),
            ("set", OptionType::Str, "solver element set"),
            ("result", OptionType::Str, "result identifier"),
            ("location", OptionType::Str, "where the result lives: qps | computed"),
            (
                "which",
                OptionType::Str,
                "which one: a quadrature point number, or e.g. 'average' for computed results",
            ),
            (
                "values",
                OptionType::Str,
                "(optional) index 'i' or slice 'a:b' extracting a subarray per element",
            ),
            (
                "f(x)",
                OptionType::Str,
                "(optional) expression applied to the result array per element",
            ),
        ],
    },
    KeywordSpec {
        name: "*ensightCaseOptions",
        doc: "modify Ensight case export options",
        options: &[(
            "discardTime",
            OptionType::Str,
            "yes/no: replace time values by an enumeration of the time steps",
        )],
    },
    KeywordSpec {
        name: "*include",
        doc: "load an extra export-definition fragment, path relative to the including file",
        options: &[("input", OptionType::Str, "file name")],
    },
];

fn keyword_spec(name: &str) -> Option<&'static KeywordSpec> {
    KEYWORDS.iter().find(|spec| spec.name == name)
}

/// One keyword entry of the export definition.
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub keyword: &'static str,
    options: IndexMap<String, OptionValue>,
    /// Tokenized bare lines following the keyword line.
    pub data: Vec<Vec<String>>,
}

impl ConfigEntry {
    pub fn str(&self, option: &str) -> Option<&str> {
        match self.options.get(option) {
            Some(OptionValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, option: &str) -> Option<i64> {
        match self.options.get(option) {
            Some(OptionValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn float(&self, option: &str) -> Option<f64> {
        match self.options.get(option) {
            Some(OptionValue::Float(v)) => Some(*v),
            Some(OptionValue::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn require_str(&self, option: &'static str) -> Result<&str, ConfigError> {
        self.str(option).ok_or(ConfigError::MissingOption {
            keyword: self.keyword,
            option,
        })
    }

    pub fn require_int(&self, option: &'static str) -> Result<i64, ConfigError> {
        self.int(option).ok_or(ConfigError::MissingOption {
            keyword: self.keyword,
            option,
        })
    }
}

/// A parsed export definition: all entries in file order.
#[derive(Debug, Default, Clone)]
pub struct ExportConfig {
    entries: Vec<ConfigEntry>,
}

impl ExportConfig {
    /// All entries of one keyword, in file order.
    pub fn entries(&self, keyword: &str) -> impl Iterator<Item = &ConfigEntry> {
        let keyword = keyword.to_string();
        self.entries.iter().filter(move |e| e.keyword == keyword)
    }

    /// Whether `discardTime=yes` was requested.
    pub fn discard_time_marks(&self) -> bool {
        self.entries("*ensightCaseOptions")
            .filter_map(|e| e.str("discardTime"))
            .any(|v| v.eq_ignore_ascii_case("yes"))
    }

    fn push(&mut self, entry: ConfigEntry) {
        self.entries.push(entry);
    }
}

/// Parses an export-definition file, following `*include` directives.
pub fn parse_export_file(path: impl AsRef<Path>) -> Result<ExportConfig, ConfigError> {
    let mut config = ExportConfig::default();
    parse_into(path.as_ref(), &mut config)?;
    Ok(config)
}

fn parse_into(path: &Path, config: &mut ExportConfig) -> Result<(), ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut current: Option<ConfigEntry> = None;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("**") {
            continue;
        }
        if let Some(rest) = line.strip_prefix('*') {
            if let Some(entry) = current.take() {
                config.push(entry);
            }
            let mut fields = rest.split(',');
            let keyword_name = format!("*{}", fields.next().unwrap_or_default().trim());
            let spec = keyword_spec(&keyword_name).ok_or_else(|| ConfigError::UnknownKeyword {
                keyword: keyword_name.trim_start_matches('*').to_string(),
            })?;

            let mut entry = ConfigEntry {
                keyword: spec.name,
                options: IndexMap::new(),
                data: Vec::new(),
            };
            for assignment in fields {
                let assignment = assignment.trim();
                if assignment.is_empty() {
                    continue;
                }
                let (key, value) = assignment
                    .split_once('=')
                    .map(|(k, v)| (k.trim(), unquote(v.trim())))
                    .unwrap_or((assignment, String::new()));
                let (_, option_type, _) = spec
                    .options
                    .iter()
                    .find(|(name, _, _)| *name == key)
                    .ok_or_else(|| ConfigError::UnknownOption {
                        keyword: spec.name.trim_start_matches('*').to_string(),
                        option: key.to_string(),
                    })?;
                let typed = convert(&value, *option_type).ok_or_else(|| {
                    ConfigError::InvalidValue {
                        keyword: spec.name.trim_start_matches('*').to_string(),
                        option: key.to_string(),
                        value: value.clone(),
                        expected: option_type.name(),
                    }
                })?;
                entry.options.insert(key.to_string(), typed);
            }

            if entry.keyword == "*include" {
                let include = entry.require_str("input")?.to_string();
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                parse_into(&base.join(include), config)?;
            } else {
                current = Some(entry);
            }
        } else if let Some(entry) = current.as_mut() {
            let tokens: Vec<String> = line
                .split([',', ' ', '\t'])
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            entry.data.push(tokens);
        }
    }
    if let Some(entry) = current.take() {
        config.push(entry);
    }
    Ok(())
}

fn unquote(value: &str) -> String {
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    value.to_string()
}

fn convert(value: &str, option_type: OptionType) -> Option<OptionValue> {
    match option_type {
        OptionType::Int => value.parse().ok().map(OptionValue::Int),
        OptionType::Float => value.parse().ok().map(OptionValue::Float),
        OptionType::Str => Some(OptionValue::Str(value.to_string())),
    }
}

/// The keyword reference printed by `filsight --keywords`.
pub fn keyword_reference() -> String {
    let mut out = String::new();
    for spec in KEYWORDS {
        let _ = writeln!(out, "    {}", spec.name);
        let _ = writeln!(out, "        {}", spec.doc);
        for (name, option_type, doc) in spec.options {
            let _ = writeln!(out, "        {:<24}{:<10}{}", name, option_type.name(), doc);
        }
        let _ = writeln!(out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.inp");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn parses_keywords_options_and_data() {
        let (_dir, path) = write_config(
            "** a comment\n\
             *defineElementType, element=B21, shape=bar2\n\
             *substituteElSet, elSet=WEB\n\
             1, 2, 3\n\
             4 5\n\
             *ensightPerNodeVariableJob, name=U, dimensions=3\n",
        );
        let config = parse_export_file(&path).unwrap();

        let def: Vec<_> = config.entries("*defineElementType").collect();
        assert_eq!(def.len(), 1);
        assert_eq!(def[0].str("element"), Some("B21"));
        assert_eq!(def[0].str("shape"), Some("bar2"));

        let sub: Vec<_> = config.entries("*substituteElSet").collect();
        assert_eq!(sub[0].data, vec![vec!["1", "2", "3"], vec!["4", "5"]]);

        let job: Vec<_> = config.entries("*ensightPerNodeVariableJob").collect();
        assert_eq!(job[0].int("dimensions"), Some(3));
    }

    #[test]
    fn rejects_unknown_keyword() {
        let (_dir, path) = write_config("*notAKeyword, a=b\n");
        assert!(matches!(
            parse_export_file(&path),
            Err(ConfigError::UnknownKeyword { .. })
        ));
    }

    #[test]
    fn rejects_unknown_option() {
        let (_dir, path) = write_config("*defineElementType, element=B21, color=red\n");
        assert!(matches!(
            parse_export_file(&path),
            Err(ConfigError::UnknownOption { .. })
        ));
    }

    #[test]
    fn rejects_inconvertible_value() {
        let (_dir, path) = write_config("*ensightPerNodeVariableJob, name=U, dimensions=three\n");
        assert!(matches!(
            parse_export_file(&path),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn follows_includes() {
        let dir = tempfile::tempdir().unwrap();
        let extra = dir.path().join("extra.inp");
        std::fs::write(&extra, "*defineElementType, element=CPS4, shape=quad4\n").unwrap();
        let main = dir.path().join("export.inp");
        std::fs::write(&main, "*include, input=extra.inp\n").unwrap();

        let config = parse_export_file(&main).unwrap();
        assert_eq!(config.entries("*defineElementType").count(), 1);
    }

    #[test]
    fn discard_time_marks_defaults_off() {
        let (_dir, path) = write_config("*ensightCaseOptions, discardTime=yes\n");
        let config = parse_export_file(&path).unwrap();
        assert!(config.discard_time_marks());
        assert!(!ExportConfig::default().discard_time_marks());
    }
}
