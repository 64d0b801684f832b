//! Identifier sanitation for generated C# code

/// C# keywords that cannot be used as plain identifiers
const RESERVED_WORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
    "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
    "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
    "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
    "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
    "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short",
    "sizeof", "stackalloc", "static", "string", "struct", "switch", "this", "throw", "true",
    "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual",
    "void", "volatile", "while",
];

/// Converts catalog identifiers into valid C# identifiers
#[derive(Debug, Clone)]
pub struct Sanitizer {
    reserved: Vec<&'static str>,
    prefix: char,
}

impl Sanitizer {
    pub fn new() -> Self {
        let mut reserved = RESERVED_WORDS.to_vec();
        reserved.sort_unstable();
        Self {
            reserved,
            prefix: '_',
        }
    }

    /// Prefix `name` when it collides with a reserved word
    ///
    /// Matching is case sensitive; `Class` is a valid identifier.
    pub fn sanitize(&self, name: &str) -> String {
        if self.is_reserved(name) {
            format!("{}{}", self.prefix, name)
        } else {
            name.to_string()
        }
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.binary_search(&name).is_ok()
    }

    /// Like [`Sanitizer::sanitize`], but first replaces characters that cannot
    /// appear in an identifier. Used for result-set column names, which are not
    /// constrained by the catalog.
    pub fn identifier(&self, name: &str) -> String {
        let mut ident: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        if ident.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            ident.insert(0, self.prefix);
        }
        self.sanitize(&ident)
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_reserved_word() {
        let sanitizer = Sanitizer::new();
        assert_eq!(sanitizer.sanitize("class"), "_class");
        assert_eq!(sanitizer.sanitize("while"), "_while");
        assert_eq!(sanitizer.sanitize("double"), "_double");
    }

    #[test]
    fn test_sanitize_plain_name() {
        let sanitizer = Sanitizer::new();
        assert_eq!(sanitizer.sanitize("amount"), "amount");
        assert_eq!(sanitizer.sanitize("Class"), "Class");
    }

    #[test]
    fn test_reserved_words_sorted_once() {
        let sanitizer = Sanitizer::new();
        let mut sorted = sanitizer.reserved.clone();
        sorted.sort_unstable();
        assert_eq!(sanitizer.reserved, sorted);
        assert!(RESERVED_WORDS.iter().all(|w| sanitizer.is_reserved(w)));
    }

    #[test]
    fn test_identifier() {
        let sanitizer = Sanitizer::new();
        assert_eq!(sanitizer.identifier("total amount"), "total_amount");
        assert_eq!(sanitizer.identifier("1st"), "_1st");
        assert_eq!(sanitizer.identifier("string"), "_string");
    }
}
