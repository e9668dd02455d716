//! String sanitizing for the string table

/// Identifier form used for material, bone and action names
///
/// Whitespace and path separators would break the textual format's
/// whitespace-delimited lines.
pub fn identifier(name: &str) -> String {
    name.replace([' ', '/', '\\'], "_")
        .replace('\r', "")
        .replace('\n', " ")
        .trim()
        .to_string()
}

/// Single-line header field (model name, license, author)
pub fn header_line(text: &str) -> String {
    text.replace('\r', "").replace('\n', " ").trim().to_string()
}

/// Multi-line comment, line breaks normalized to CRLF
pub fn comment(text: &str) -> String {
    text.replace('\r', "").replace('\n', "\r\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("Left Arm/Upper\\x"), "Left_Arm_Upper_x");
        assert_eq!(identifier("two\r\nlines"), "two lines");
        assert_eq!(identifier("\tpadded\n"), "padded");
        assert_eq!(identifier(" lead"), "_lead");
    }

    #[test]
    fn test_header_line_keeps_spaces() {
        assert_eq!(header_line(" My Model\r\n v2 "), "My Model  v2");
    }

    #[test]
    fn test_comment_crlf() {
        assert_eq!(comment("first\nsecond\r\nthird\n"), "first\r\nsecond\r\nthird");
    }
}
