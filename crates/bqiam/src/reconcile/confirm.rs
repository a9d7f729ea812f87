use std::io::{BufRead, Write};

/// Gate in front of every mutating batch.
pub trait Confirm {
    /// Show `summary` to the operator and return whether to proceed.
    fn confirm(&mut self, summary: &str) -> bool;
}

/// Ask on `output` and proceed only if the answer read from `input` is exactly `y`.
#[derive(Debug)]
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Confirm for Prompt<R, W> {
    fn confirm(&mut self, summary: &str) -> bool {
        if write!(self.output, "{summary}Are you sure? [y/n]")
            .and_then(|()| self.output.flush())
            .is_err()
        {
            return false;
        }

        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(0) => false,
            Ok(_) => answer.trim() == "y",
            Err(e) => {
                tracing::debug!("Failed to read confirmation: {e}");
                false
            }
        }
    }
}

/// Print the summary and proceed without asking.
#[derive(Debug)]
pub struct AssumeYes<W>(pub W);

impl<W: Write> Confirm for AssumeYes<W> {
    fn confirm(&mut self, summary: &str) -> bool {
        if let Err(e) = write!(self.0, "{summary}") {
            tracing::debug!("Failed to print summary: {e}");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind, Read};

    use super::*;

    fn answer(input: &str) -> (bool, String) {
        let mut output = Vec::new();
        let proceed = Prompt::new(Cursor::new(input.as_bytes()), &mut output).confirm("REVOKE\n");
        (proceed, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_only_y_proceeds() {
        let (proceed, output) = answer("y\n");
        assert!(proceed);
        assert_eq!(output, "REVOKE\nAre you sure? [y/n]");

        assert!(answer(" y \n").0);
        assert!(!answer("yes\n").0);
        assert!(!answer("Y\n").0);
        assert!(!answer("\n").0);
        assert!(!answer("").0);
    }

    struct BrokenInput;

    impl Read for BrokenInput {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_read_error_aborts() {
        let mut prompt = Prompt::new(std::io::BufReader::new(BrokenInput), Vec::new());
        assert!(!prompt.confirm("PERMIT\n"));
    }

    #[test]
    fn test_assume_yes_prints_summary() {
        let mut output = Vec::new();
        assert!(AssumeYes(&mut output).confirm("PERMIT\n"));
        assert_eq!(output, b"PERMIT\n");
    }
}
