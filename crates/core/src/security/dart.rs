//! L-self (Dart) security rule catalog: spec §4.4's "L-self variant" adds
//! AST-resolved findings (spec §9) for process/crypto/network usage on top
//! of the raw-text secret-literal patterns shared with the JS/Python
//! catalogs. The process/crypto/network rules are matched against parsed
//! AST node structure — not flat regex over the file — via the `ast`
//! submodule; only the literal-pattern secret/URL rules stay regex-based,
//! the same way they are for every other language.

use crate::model::{Finding, Severity};
use crate::sanitize::LineIndex;
use crate::security::dedup_and_order;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

struct Rule {
    id: &'static str,
    severity: Severity,
    message: &'static str,
    pattern: &'static str,
}

/// Literal-pattern rules: secret material and cleartext URLs, matched the
/// same way across every language's catalog since there's no AST structure
/// that makes a string literal's *content* more or less a secret.
static RULES: &[Rule] = &[
    Rule { id: "dart.secret.aws-access-key", severity: Severity::Critical, message: "hardcoded AWS access key literal", pattern: r"AKIA[0-9A-Z]{16}" },
    Rule { id: "dart.secret.slack-token", severity: Severity::Critical, message: "hardcoded Slack token literal", pattern: r"xox[baprs]-[0-9A-Za-z-]{10,}" },
    Rule { id: "dart.secret.jwt", severity: Severity::High, message: "hardcoded JWT literal", pattern: r"eyJ[A-Za-z0-9_-]+\.eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+" },
    Rule { id: "dart.secret.private-key", severity: Severity::Critical, message: "embedded private key material", pattern: r"-----BEGIN (?:RSA )?PRIVATE KEY-----" },
    Rule { id: "dart.http.http-url", severity: Severity::Med, message: "cleartext http:// URL", pattern: r"http://[^\s'\x22`]+" },
];

pub fn scan(file: &str, raw: &str, sanitized: &str) -> Vec<Finding> {
    let raw_idx = LineIndex::new(raw);
    let mut findings = Vec::new();
    for rule in RULES {
        let re = compiled(rule.pattern);
        findings.extend(crate::security::scan_with_regex(raw, &raw_idx, file, rule.id, rule.severity, rule.message, &re));
    }
    findings.extend(ast::scan(file, raw, sanitized));
    dedup_and_order(findings)
}

fn compiled(pattern: &'static str) -> Regex {
    static CACHE: Lazy<Mutex<HashMap<&'static str, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));
    let mut cache = CACHE.lock().unwrap();
    cache.entry(pattern).or_insert_with(|| Regex::new(pattern).expect("Dart rule catalog regex must compile")).clone()
}

#[cfg(feature = "treesitter")]
mod ast {
    use super::*;
    use tree_sitter::{Node, Parser};

    /// Resolved import bindings for one library: which prefix (possibly
    /// empty, for an unprefixed import) a `dart:io`/`dart:math` import is
    /// bound under. Lets a qualified call like `io.Process.run(...)` be
    /// attributed to `dart:io` the same as an unprefixed `Process.run(...)`,
    /// instead of only ever matching one lexical spelling.
    #[derive(Default)]
    struct LibraryInfo {
        io_prefixes: Vec<String>,
        math_prefixes: Vec<String>,
        mirrors_import_span: Option<(usize, usize)>,
    }

    impl LibraryInfo {
        fn resolve(root: Node, source: &[u8]) -> Self {
            let mut info = LibraryInfo::default();
            let mut stack = vec![root];
            while let Some(node) = stack.pop() {
                if is_import_node(node.kind()) {
                    if let Some((uri, alias)) = parse_import(node, source) {
                        match uri.as_str() {
                            "dart:io" => info.io_prefixes.push(alias.unwrap_or_default()),
                            "dart:math" => info.math_prefixes.push(alias.unwrap_or_default()),
                            "dart:mirrors" => info.mirrors_import_span = Some((node.start_byte(), node.end_byte())),
                            _ => {}
                        }
                    }
                }
                let mut w = node.walk();
                for child in node.children(&mut w) {
                    stack.push(child);
                }
            }
            info
        }

        /// True if `qualifier` (the text before the last `.` in a call's
        /// callee, or "" for an unqualified call) resolves to `dart:io`.
        fn binds_io(&self, qualifier: &str) -> bool {
            self.io_prefixes.iter().any(|p| p == qualifier)
        }

        fn binds_math(&self, qualifier: &str) -> bool {
            self.math_prefixes.iter().any(|p| p == qualifier)
        }
    }

    fn is_import_node(kind: &str) -> bool {
        matches!(kind, "import_or_export" | "importOrExport" | "import_specification" | "importSpecification")
    }

    fn first_string_literal<'a>(node: Node<'a>, source: &'a [u8]) -> Option<&'a str> {
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if matches!(n.kind(), "string_literal" | "StringLiteral" | "uri" | "dart_string_literal") {
                return n.utf8_text(source).ok().map(strip_quotes);
            }
            let mut w = n.walk();
            for child in n.children(&mut w) {
                stack.push(child);
            }
        }
        None
    }

    fn strip_quotes(s: &str) -> &str {
        let t = s.trim();
        if (t.starts_with('"') && t.ends_with('"')) || (t.starts_with('\'') && t.ends_with('\'')) {
            &t[1..t.len() - 1]
        } else {
            t
        }
    }

    fn parse_import(node: Node, source: &[u8]) -> Option<(String, Option<String>)> {
        let uri = first_string_literal(node, source)?.to_string();
        let mut alias = None;
        let mut saw_as = false;
        let mut w = node.walk();
        for child in node.children(&mut w) {
            match child.kind() {
                "as" => saw_as = true,
                "identifier" | "Identifier" if saw_as => {
                    alias = child.utf8_text(source).ok().map(str::to_string);
                }
                _ => {}
            }
        }
        Some((uri, alias))
    }

    /// Splits a dotted call target (`Process.run`, `io.Process.run`) into
    /// its leading qualifier (`""`, `"Process"`, `"io.Process"`) and
    /// trailing member (`run`), so a call node can be matched against a
    /// resolved import prefix rather than the raw source text.
    fn split_qualifier(callee: &str) -> (&str, &str) {
        match callee.rsplit_once('.') {
            Some((head, tail)) => (head, tail),
            None => ("", callee),
        }
    }

    fn is_invocation_node(kind: &str) -> bool {
        matches!(
            kind,
            "method_invocation" | "methodInvocation" | "function_expression_invocation" | "functionExpressionInvocation" | "instance_creation_expression" | "instanceCreationExpression"
        )
    }

    fn callee_text<'a>(node: Node<'a>, source: &'a [u8]) -> Option<&'a str> {
        // The callee is everything before the argument list's opening
        // paren. Cheaper and more grammar-version-tolerant than walking
        // named fields that differ between the snake_case and camelCase
        // node-kind spellings this grammar has shipped under.
        let text = node.utf8_text(source).ok()?;
        let paren = text.find('(')?;
        Some(text[..paren].trim())
    }

    fn has_true_named_argument(node: Node, source: &[u8], name: &str) -> bool {
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if matches!(n.kind(), "named_argument" | "namedArgument") {
                if let Ok(text) = n.utf8_text(source) {
                    let normalized: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                    if normalized == format!("{name}:true") {
                        return true;
                    }
                }
            }
            let mut w = n.walk();
            for child in n.children(&mut w) {
                stack.push(child);
            }
        }
        false
    }

    /// A `Process.run(...)`/`Process.runSync(...)`/`Process.start(...)`
    /// call, resolved against `lib`'s `dart:io` import bindings so a
    /// same-named local class's `.run()` isn't mistaken for the real one.
    fn process_run_method(callee: &str, lib: &LibraryInfo) -> Option<&'static str> {
        let (qualifier, member) = split_qualifier(callee);
        let method = match member {
            "run" => "run",
            "runSync" => "runSync",
            "start" => "start",
            _ => return None,
        };
        let (receiver_qualifier, receiver) = split_qualifier(qualifier);
        if receiver != "Process" {
            return None;
        }
        if lib.binds_io(receiver_qualifier) {
            Some(method)
        } else {
            None
        }
    }

    fn is_bare_random_call(callee: &str, lib: &LibraryInfo) -> bool {
        let (qualifier, member) = split_qualifier(callee);
        member == "Random" && lib.binds_math(qualifier)
    }

    fn is_assignment_node(kind: &str) -> bool {
        matches!(kind, "assignment_expression" | "assignmentExpression")
    }

    fn finding_for(node: Node, file: &str, rule_id: &'static str, severity: Severity, message: impl Into<String>, raw: &str) -> Finding {
        let start = node.start_position();
        let snippet: String = node.utf8_text(raw.as_bytes()).unwrap_or("").trim().chars().take(200).collect();
        Finding {
            rule_id: rule_id.to_string(),
            severity,
            message: message.into(),
            file: file.to_string(),
            line: start.row + 1,
            column: Some(start.column + 1),
            snippet,
            code: None,
            start_offset: node.start_byte(),
            end_offset: node.end_byte(),
        }
    }

    pub fn scan(file: &str, raw: &str, sanitized: &str) -> Vec<Finding> {
        let mut parser = Parser::new();
        if parser.set_language(&tree_sitter_dart::LANGUAGE.into()).is_err() {
            return super::fallback::scan(file, sanitized);
        }
        let Some(tree) = parser.parse(raw, None) else {
            return super::fallback::scan(file, sanitized);
        };
        let root = tree.root_node();
        let source = raw.as_bytes();
        let lib = LibraryInfo::resolve(root, source);

        let mut findings = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let kind = node.kind();
            if is_import_node(kind) {
                if lib.mirrors_import_span == Some((node.start_byte(), node.end_byte())) {
                    findings.push(finding_for(node, file, "dart.mirrors.use", Severity::Low, "dart:mirrors reflection used", raw));
                }
            } else if is_invocation_node(kind) {
                if let Some(callee) = callee_text(node, source) {
                    if let Some(method) = process_run_method(callee, &lib) {
                        findings.push(finding_for(node, file, "dart.process.run", Severity::Med, format!("Process.{method} invoked"), raw));
                        if has_true_named_argument(node, source, "runInShell") {
                            findings.push(finding_for(node, file, "dart.process.run.shell", Severity::Critical, "Process.run invoked with runInShell: true", raw));
                        }
                    } else if is_bare_random_call(callee, &lib) {
                        let trailing = &raw[node.end_byte()..(node.end_byte() + 8).min(raw.len())];
                        if !trailing.trim_start().starts_with(".secure") {
                            findings.push(finding_for(node, file, "dart.random.insecure", Severity::Med, "Random() used where a secure token is expected", raw));
                        }
                    }
                }
            } else if is_assignment_node(kind) {
                if let Ok(text) = node.utf8_text(source) {
                    if text.trim_start().starts_with("badCertificateCallback") {
                        findings.push(finding_for(node, file, "dart.http.badcert", Severity::Critical, "badCertificateCallback bypasses certificate validation", raw));
                    }
                }
            } else if matches!(kind, "identifier" | "Identifier" | "simple_identifier" | "SimpleIdentifier") && node.utf8_text(source) == Ok("environment") {
                if let Some(parent) = node.parent() {
                    if let Ok(ptext) = parent.utf8_text(source) {
                        if ptext.trim_start().starts_with("Platform.environment") {
                            findings.push(finding_for(parent, file, "dart.platform.env", Severity::Info, "Platform.environment accessed", raw));
                        }
                    }
                }
            }
            let mut w = node.walk();
            for child in node.children(&mut w) {
                stack.push(child);
            }
        }
        dedup_and_order(findings)
    }
}

#[cfg(not(feature = "treesitter"))]
mod ast {
    use super::Finding;

    pub fn scan(file: &str, _raw: &str, sanitized: &str) -> Vec<Finding> {
        super::fallback::scan(file, sanitized)
    }
}

/// Regex fallback used when the `treesitter` feature (and its native Dart
/// grammar dependency) isn't built in. Same rule ids and severities as the
/// AST path, matched over sanitized text instead of parsed nodes.
mod fallback {
    use super::*;

    struct FallbackRule {
        id: &'static str,
        severity: Severity,
        message: &'static str,
        pattern: &'static str,
    }

    static FALLBACK_RULES: &[FallbackRule] = &[
        FallbackRule { id: "dart.process.run", severity: Severity::Med, message: "Process.run invoked", pattern: r"\bProcess\.(?:run|runSync|start)\s*\(" },
        FallbackRule { id: "dart.process.run.shell", severity: Severity::Critical, message: "Process.run invoked with runInShell: true", pattern: r"runInShell\s*:\s*true" },
        FallbackRule { id: "dart.random.insecure", severity: Severity::Med, message: "Random() used where a secure token is expected", pattern: r"\bRandom\s*\(\s*\)(?!\.secure)" },
        FallbackRule { id: "dart.http.badcert", severity: Severity::Critical, message: "badCertificateCallback bypasses certificate validation", pattern: r"badCertificateCallback\s*=" },
        FallbackRule { id: "dart.platform.env", severity: Severity::Info, message: "Platform.environment accessed", pattern: r"Platform\.environment\b" },
        FallbackRule { id: "dart.mirrors.use", severity: Severity::Low, message: "dart:mirrors reflection used", pattern: r#"import\s+['"]dart:mirrors['"]"# },
    ];

    pub fn scan(file: &str, sanitized: &str) -> Vec<Finding> {
        let idx = LineIndex::new(sanitized);
        let mut findings = Vec::new();
        for rule in FALLBACK_RULES {
            let re = compiled(rule.pattern);
            findings.extend(crate::security::scan_with_regex(sanitized, &idx, file, rule.id, rule.severity, rule.message, &re));
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_url_rule_runs_against_raw_text() {
        let src = "final uri = 'http://example.com/api';\n";
        let sanitized = crate::sanitize::sanitize(src, crate::sanitize::SanitizeOptions::dart());
        let findings = scan("client.dart", src, &sanitized);
        assert!(findings.iter().any(|f| f.rule_id == "dart.http.http-url"));
    }

    #[test]
    fn shell_flag_detected_in_process_run() {
        let src = "void f() { Process.run('ls', ['-la'], runInShell: true); }\n";
        let sanitized = crate::sanitize::sanitize(src, crate::sanitize::SanitizeOptions::dart());
        let findings = scan("run.dart", src, &sanitized);
        assert!(findings.iter().any(|f| f.rule_id == "dart.process.run.shell"));
    }

    #[test]
    fn catalog_covers_representative_secret_rule_ids() {
        let ids: Vec<&str> = RULES.iter().map(|r| r.id).collect();
        for must_have in ["dart.secret.aws-access-key", "dart.http.http-url"] {
            assert!(ids.contains(&must_have), "missing rule id {must_have}");
        }
    }
}
