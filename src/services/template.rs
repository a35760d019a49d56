//! Template library and renderer.
//!
//! One template file per template id under `templates/` in the stack
//! directory. Templates may declare required parameters in `#!` header
//! lines (`#! requires: port, domain`); header lines are stripped from the
//! output. Placeholders are `{{ name }}` with dotted paths for nested
//! values.
//!
//! Rendering is pure: identical template and context always produce
//! byte-identical output, which is what makes the artifact store's
//! fingerprint diff meaningful.

use crate::domain::errors::RenderError;
use crate::domain::models::{Artifact, CtxValue, RenderContext};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const TEMPLATE_DIR: &str = "templates";
pub const TEMPLATE_EXT: &str = "tmpl";

#[derive(Debug)]
pub struct Template {
    pub id: String,
    pub requires: Vec<String>,
    body: String,
}

pub fn template_path(stack_dir: &Path, id: &str) -> PathBuf {
    stack_dir
        .join(TEMPLATE_DIR)
        .join(format!("{id}.{TEMPLATE_EXT}"))
}

pub fn load_template(stack_dir: &Path, id: &str) -> Result<Template, RenderError> {
    let path = template_path(stack_dir, id);
    let raw = std::fs::read_to_string(&path)
        .map_err(|_| RenderError::TemplateNotFound(id.to_string()))?;
    parse_template(id, &raw)
}

pub fn parse_template(id: &str, raw: &str) -> Result<Template, RenderError> {
    let mut requires = Vec::new();
    let mut body = String::new();
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("#!") {
            let rest = rest.trim();
            // A misspelled directive must not silently disable validation.
            let Some(names) = rest.strip_prefix("requires:") else {
                return Err(RenderError::Syntax {
                    template: id.to_string(),
                    message: format!("unknown directive: #! {rest}"),
                });
            };
            requires.extend(
                names
                    .split([',', ' '])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }
    Ok(Template {
        id: id.to_string(),
        requires,
        body,
    })
}

pub fn render(
    template: &Template,
    service: &str,
    ctx: &RenderContext,
) -> Result<Artifact, RenderError> {
    let mut out = String::with_capacity(template.body.len());
    let mut rest = template.body.as_str();

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(RenderError::Syntax {
                template: template.id.clone(),
                message: "unterminated placeholder".to_string(),
            });
        };
        let key = after[..end].trim();
        if key.is_empty() {
            return Err(RenderError::Syntax {
                template: template.id.clone(),
                message: "empty placeholder".to_string(),
            });
        }
        match ctx.lookup(key) {
            Some(CtxValue::Str(v)) => out.push_str(v),
            Some(CtxValue::Map(_)) => {
                return Err(RenderError::Evaluation {
                    template: template.id.clone(),
                    message: format!("cannot substitute a mapping: {key}"),
                })
            }
            None => {
                return Err(RenderError::Evaluation {
                    template: template.id.clone(),
                    message: format!("undefined variable: {key}"),
                })
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);

    Ok(Artifact {
        service: service.to_string(),
        fingerprint: fingerprint(out.as_bytes()),
        content: out,
    })
}

pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
