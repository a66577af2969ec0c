//! Interpreting what the user submits from the compose box.

/// One submitted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission<'a> {
    /// `/nick <name>`
    Rename(&'a str),
    /// `/nick` with nothing after it.
    RenameUsage,
    Chat(&'a str),
    /// Nothing but whitespace.
    Empty,
}

impl<'a> Submission<'a> {
    pub fn parse(input: &'a str) -> Self {
        if input.trim().is_empty() {
            return Submission::Empty;
        }
        match input.strip_prefix("/nick") {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
                match rest.trim() {
                    "" => Submission::RenameUsage,
                    name => Submission::Rename(name),
                }
            }
            _ => Submission::Chat(input),
        }
    }
}
