use anyhow::{Context, Result};

use crate::macros::MacroMap;

/// One line per macro, names aligned: `NAME  value  (file:line)`.
pub fn render_text(macros: &MacroMap) -> String {
    let width = macros.keys().map(String::len).max().unwrap_or(0);

    let mut lines = Vec::with_capacity(macros.len());
    for (name, def) in macros {
        lines.push(format!(
            "{:width$}  {}  ({}:{})",
            name,
            def.value(),
            def.source_file().display(),
            def.source_line(),
            width = width
        ));
    }
    lines.join("\n")
}

/// JSON object keyed by macro name, in map order.
pub fn render_json(macros: &MacroMap) -> Result<String> {
    serde_json::to_string_pretty(macros).context("Failed to serialize macros")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::MacroDef;

    fn sample() -> MacroMap {
        let mut macros = MacroMap::new();
        for (line, (name, body)) in [("r_dir_perms", "{ open read search }"), ("x", "{ map }")]
            .into_iter()
            .enumerate()
        {
            let def = MacroDef::new(name, body, "sepolicy/global_macros", line + 1, None).unwrap();
            macros.insert(name.to_string(), def);
        }
        macros
    }

    #[test]
    fn text_output_aligns_names() {
        let rendered = render_text(&sample());
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "r_dir_perms  { open read search }  (sepolicy/global_macros:1)"
        );
        assert_eq!(lines[1], "x            { map }  (sepolicy/global_macros:2)");
    }

    #[test]
    fn text_output_empty() {
        assert_eq!(render_text(&MacroMap::new()), "");
    }

    #[test]
    fn json_output_keyed_by_name() {
        let json = render_json(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["x"]["raw_expansion"], "{ map }");
        assert_eq!(value["x"]["source_line"], 2);
        assert_eq!(value["r_dir_perms"]["source_file"], "sepolicy/global_macros");
        assert!(value["x"]["expanded_value"].is_null());
    }
}
