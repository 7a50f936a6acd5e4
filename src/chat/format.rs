use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[0-9]+\)").expect("numbered line pattern is valid"));

/// One piece of bot-visible markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// A numbered line such as `1) ...`, rendered bold.
    Strong(String),
    LineBreak,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Markup {
    segments: Vec<Segment>,
}

impl Markup {
    #[cfg(test)]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Text with line breaks turned back into `\n`.
    pub fn plain(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) | Segment::Strong(text) => out.push_str(text),
                Segment::LineBreak => out.push('\n'),
            }
        }
        out
    }

    /// Splits the markup at line breaks. Each line is a list of `(text, strong)` runs.
    pub fn lines(&self) -> Vec<Vec<(&str, bool)>> {
        let mut lines = vec![Vec::new()];
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => push_run(&mut lines, text, false),
                Segment::Strong(text) => push_run(&mut lines, text, true),
                Segment::LineBreak => lines.push(Vec::new()),
            }
        }
        if self.segments.is_empty() {
            lines.clear();
        }
        lines
    }

    /// HTML rendering: `<b>` for numbered lines, `<br>` between lines.
    pub fn to_html(&self) -> String {
        self.to_string()
    }
}

fn push_run<'a>(lines: &mut [Vec<(&'a str, bool)>], text: &'a str, strong: bool) {
    if let Some(current) = lines.last_mut() {
        current.push((text, strong));
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => f.write_str(&escape_html(text))?,
                Segment::Strong(text) => write!(f, "<b>{}</b>", escape_html(text))?,
                Segment::LineBreak => f.write_str("<br>")?,
            }
        }
        Ok(())
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Turns bot text into markup. Must be given the whole text seen so far, since a
/// numbered prefix can straddle two stream chunks.
pub fn format_lines(text: &str) -> Markup {
    let mut segments = Vec::new();
    if text.is_empty() {
        return Markup { segments };
    }

    for (idx, line) in text.split('\n').enumerate() {
        if idx > 0 {
            segments.push(Segment::LineBreak);
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        if is_numbered_line(line) {
            segments.push(Segment::Strong(line.to_string()));
        } else if !line.is_empty() {
            segments.push(Segment::Text(line.to_string()));
        }
    }

    Markup { segments }
}

pub fn is_numbered_line(line: &str) -> bool {
    NUMBERED_LINE.is_match(line)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn numbered_lines_are_bold_and_joined_with_breaks() {
        let markup = format_lines("Steps:\n1) water daily\n  12) prune\nend");
        assert_eq!(
            markup.segments(),
            &[
                Segment::Text("Steps:".to_string()),
                Segment::LineBreak,
                Segment::Strong("1) water daily".to_string()),
                Segment::LineBreak,
                Segment::Strong("  12) prune".to_string()),
                Segment::LineBreak,
                Segment::Text("end".to_string()),
            ]
        );
        assert_eq!(
            markup.to_html(),
            "Steps:<br><b>1) water daily</b><br><b>  12) prune</b><br>end"
        );
    }

    #[test]
    fn non_matching_lines_pass_through() {
        let lines = ["1.) no", "a1) no", ") no", "1 ) no", "plain text", "٣) not ascii"];
        for line in lines {
            assert_eq!(format_lines(line).segments(), &[Segment::Text(line.to_string())]);
        }
    }

    #[test]
    fn crlf_and_lf_both_break_lines() {
        let markup = format_lines("a\r\n2) b\nc");
        assert_eq!(markup.to_html(), "a<br><b>2) b</b><br>c");
        assert_eq!(markup.plain(), "a\n2) b\nc");
    }

    #[test]
    fn empty_input_is_empty_markup() {
        let markup = format_lines("");
        assert!(markup.is_empty());
        assert_eq!(markup.to_html(), "");
        assert!(markup.lines().is_empty());
    }

    #[test]
    fn blank_lines_keep_their_breaks() {
        assert_eq!(format_lines("a\n\nb").to_html(), "a<br><br>b");
        assert_eq!(format_lines("a\n").to_html(), "a<br>");
    }

    #[test]
    fn formatting_is_deterministic() {
        let text = "intro\n3) third\r\nmore <stuff>";
        assert_eq!(format_lines(text), format_lines(text));
        assert_eq!(format_lines(text).to_html(), format_lines(text).to_html());
    }

    #[test]
    fn html_output_escapes_text() {
        assert_eq!(
            format_lines("<img src=x>\n1) a & b").to_html(),
            "&lt;img src=x&gt;<br><b>1) a &amp; b</b>"
        );
    }

    #[test]
    fn lines_groups_runs_per_line() {
        let markup = format_lines("x\n1) y");
        assert_eq!(markup.lines(), vec![vec![("x", false)], vec![("1) y", true)]]);
    }
}
