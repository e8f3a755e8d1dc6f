//! Generic fallback: import- and include-like statements found by regex

use std::sync::LazyLock;

use regex::Regex;

use crate::extractor::ExtractionBuilder;

struct ImportPattern {
    regex: Regex,
    /// Capture group holding the module spec.
    group: usize,
}

fn pattern(re: &str, group: usize) -> ImportPattern {
    ImportPattern {
        regex: Regex::new(re).expect("import pattern is valid"),
        group,
    }
}

static IMPORT_PATTERNS: LazyLock<Vec<ImportPattern>> = LazyLock::new(|| {
    vec![
        // from a.b import c
        pattern(r"^\s*from\s+(\.*[\w.]*)\s+import\s", 1),
        // import a.b / import a.b.C; (Python, Java)
        pattern(r"^\s*import\s+(?:static\s+)?([\w.]+)\s*(?:as\s+\w+\s*)?;?\s*$", 1),
        // import x from 'm' / export * from 'm'
        pattern(r#"^\s*(?:import|export)\s.*?\bfrom\s+['"]([^'"]+)['"]"#, 1),
        // import 'm' / Go single import "m"
        pattern(r#"^\s*import\s+(?:\w+\s+)?['"]([^'"]+)['"]"#, 1),
        // require('m')
        pattern(r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#, 1),
        // #include "m" / <m>
        pattern(r#"^\s*#\s*include\s*[<"]([^>"]+)[>"]"#, 1),
        // use a::b;
        pattern(r"^\s*(?:pub(?:\([\w:]+\))?\s+)?use\s+([\w:]+)", 1),
    ]
});

/// Record every import-like line as a module reference.
pub fn scan_imports(text: &str, out: &mut ExtractionBuilder) {
    for (index, line) in text.lines().enumerate() {
        let at = u32::try_from(index + 1).unwrap_or(u32::MAX);
        for pattern in IMPORT_PATTERNS.iter() {
            if let Some(spec) = pattern.regex.captures(line).and_then(|c| c.get(pattern.group)) {
                out.import_module(None, spec.as_str().trim_end_matches("::"), at);
                break;
            }
        }
    }
}
