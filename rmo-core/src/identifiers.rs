//!
//! Grammar checks for the different kinds of names the runtime stores in its tables.
//!
//! Non-ASCII characters are accepted anywhere an identifier character is allowed.
//!

/// Operator method names that are not made of identifier characters.
const OPERATOR_METHODS: &[&str] = &[
    "[]", "[]=", "+", "-", "*", "/", "%", "**", "==", "===", "!=", "!", "=~", "!~", "<=>", "<",
    "<=", ">", ">=", "<<", ">>", "&", "|", "^", "~", "+@", "-@", "`",
];

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || !c.is_ascii()
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || !c.is_ascii()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_identifier_start(c) => chars.all(is_identifier_char),
        _ => false,
    }
}

/// Constant names start with an uppercase letter.
pub fn is_valid_constant_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_uppercase() => chars.all(is_identifier_char),
        _ => false,
    }
}

/// Class variable names look like `@@name`.
pub fn is_valid_class_variable_name(name: &str) -> bool {
    match name.strip_prefix("@@") {
        Some(rest) => is_identifier(rest),
        None => false,
    }
}

/// Instance variable names look like `@name`.
pub fn is_valid_instance_variable_name(name: &str) -> bool {
    match name.strip_prefix('@') {
        Some(rest) => !rest.starts_with('@') && is_identifier(rest),
        None => false,
    }
}

/// Method names are identifiers optionally ending in `?`, `!` or `=`, or one of the operators.
pub fn is_valid_method_name(name: &str) -> bool {
    if OPERATOR_METHODS.contains(&name) {
        return true;
    }

    let stem = name
        .strip_suffix('?')
        .or_else(|| name.strip_suffix('!'))
        .or_else(|| name.strip_suffix('='))
        .unwrap_or(name);

    is_identifier(stem)
}

/// Split a scoped constant path like `::A::B::C` into its anchoring and segments.
///
/// Returns whether the path is anchored at the root (leading `::`) and the segments in order.
/// Empty segments are kept so that callers can report them as wrong constant names.
pub fn split_constant_path(path: &str) -> (bool, Vec<&str>) {
    match path.strip_prefix("::") {
        Some(rest) => (true, rest.split("::").collect()),
        None => (false, path.split("::").collect()),
    }
}
