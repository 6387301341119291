//! Classification of the text lines the board sends before the payload

const ACK_TOKEN: &[u8] = b"ACK";
const DATA_TOKEN: &[u8] = b"DATA,";

/// What a single line received during the header phase means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderLine {
    /// Empty or whitespace only
    Blank,
    /// Acknowledgement of the command (`...ACK`)
    Ack,
    /// `DATA,<n>` header; `Err` carries the header text when `<n>` is not a count
    Data(Result<usize, String>),
    /// Anything else, as a printable preview
    Other(String),
}

impl HeaderLine {
    /// Classifies a raw line (with or without its line terminator)
    pub fn classify(raw: &[u8]) -> Self {
        let line = raw.trim_ascii();
        if line.is_empty() {
            return HeaderLine::Blank;
        }
        if line.ends_with(ACK_TOKEN) {
            return HeaderLine::Ack;
        }

        if let Some(idx) = find(line, DATA_TOKEN) {
            let header = &line[idx..];
            if header.is_ascii() {
                // ASCII was checked just above
                let header = String::from_utf8_lossy(header).into_owned();
                return HeaderLine::Data(parse_count(&header).ok_or(header));
            }
        }

        HeaderLine::Other(preview(line))
    }
}

/// Declared sample count: the integer after the first comma
fn parse_count(header: &str) -> Option<usize> {
    let (_, count) = header.split_once(',')?;
    count.trim().parse().ok()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Printable form of an unexpected line, non-ASCII bytes replaced
fn preview(line: &[u8]) -> String {
    line.iter()
        .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
        .collect()
}
