use crate::error::Error;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Render an error as markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic: what happened and,
/// where there is one, how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::InvalidConfig { reason } => format!("\
# Error: Invalid Configuration

{reason}

## Fix

Correct the value in `reflink.toml` (or the file given with `--config`).
"),

        Error::InvalidExpression { expression, reason } => format!("\
# Error: Invalid Expression

`{expression}` cannot be compiled: {reason}

## Fix

Use `string(path)`, `concat(arg, ...)` or a bare path such as `/metadata/topic/@id`.
"),

        Error::InvalidLinkKind { value } => format!("\
# Error: Invalid Link Type

`{value}` is not a link type.

## Fix

Use one of `local`, `index`, `localorindex`, `external`, `id`, `self` or `none`.
"),

        Error::InvalidTarget { id } => format!("\
# Error: Invalid Target

`{id}` is not a code entity reference or topic id.
"),

        Error::UnknownTarget { id } => format!("\
# Error: Unknown Target

No reference target or conceptual topic has the id `{id}`.

## Fix

Check that the file declaring it is matched by a `[[targets]]` source:

    reflink index
"),

        Error::SchemaInvalid { file, reason } => format!("\
# Error: Invalid Targets File

`{}` is not a valid reference targets file: {reason}
", file.display()),

        Error::Store { path, source } => format!("\
# Error: Target Store

`{}`: {source}

## Fix

Delete the store and rebuild it:

    reflink index
", path.display()),

        Error::TomlDe(e) => format!("\
# Error: Invalid TOML

{e}
"),

        Error::Xml { file, source } => format!("\
# Error: Malformed XML

`{}`: {source}
", file.display()),

        Error::Io(_) | Error::Json(_) | Error::Marker { .. } => format!("\
# Error

{e}
"),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_target_suggests_reindexing() {
        let md = render_error(&Error::UnknownTarget {
            id: "T:A.B".to_string(),
        });
        assert!(md.starts_with("# Error: Unknown Target"));
        assert!(md.contains("`T:A.B`"));
        assert!(md.contains("reflink index"));
    }

    #[test]
    fn generic_errors_carry_the_message() {
        let md = render_error(&Error::Marker {
            element: "referenceLink",
            reason: "missing `target` attribute".to_string(),
        });
        assert!(md.contains("invalid referenceLink element: missing `target` attribute"));
    }
}
