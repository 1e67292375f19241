//! Config file templating: `{{name}}` placeholders filled from a value map.

use std::collections::BTreeMap;
use std::path::Path;

use super::{AdapterError, Templater};

/// Replaces `{{ name }}` (whitespace inside the braces is ignored).
/// Unknown placeholders are an error so a typo never lands in a config file.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderTemplater;

impl Templater for PlaceholderTemplater {
    fn render(
        &self,
        template: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<String, AdapterError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| AdapterError::Template("unclosed '{{'".to_string()))?;
            let name = after[..end].trim();
            let value = values
                .get(name)
                .ok_or_else(|| AdapterError::Template(format!("no value for {{{{{}}}}}", name)))?;
            out.push_str(value);
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Render `template` and write it to `destination`, creating parent directories.
pub fn write_config_file(
    templater: &dyn Templater,
    template: &str,
    values: &BTreeMap<String, String>,
    destination: &Path,
) -> Result<(), AdapterError> {
    let rendered = templater.render(template, values)?;
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| AdapterError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(destination, rendered).map_err(|source| AdapterError::Io {
        path: destination.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> BTreeMap<String, String> {
        let mut v = BTreeMap::new();
        v.insert("font_family".to_string(), "JetBrains Mono".to_string());
        v.insert("font_size".to_string(), "14".to_string());
        v
    }

    #[test]
    fn substitutes_placeholders() {
        let t = "[font]\nnormal = { family = \"{{font_family}}\" }\nsize = {{ font_size }}\n";
        let out = PlaceholderTemplater.render(t, &values()).unwrap();
        assert_eq!(
            out,
            "[font]\nnormal = { family = \"JetBrains Mono\" }\nsize = 14\n"
        );
    }

    #[test]
    fn unknown_placeholder_is_error() {
        let err = PlaceholderTemplater
            .render("{{theme}}", &values())
            .unwrap_err();
        assert_eq!(err.to_string(), "template: no value for {{theme}}");
    }

    #[test]
    fn unclosed_placeholder_is_error() {
        assert!(PlaceholderTemplater.render("a {{b", &values()).is_err());
    }

    #[test]
    fn writes_file_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join(".config/alacritty/alacritty.toml");
        write_config_file(&PlaceholderTemplater, "size = {{font_size}}", &values(), &dest)
            .unwrap();
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "size = 14");
    }
}
