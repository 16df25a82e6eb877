//! Indentation-aware text builder for the emitted C blocks.

const INDENT: &str = "  ";

#[derive(Debug, Default, Clone)]
pub struct Formatter {
    out: String,
    depth: usize,
}

impl Formatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn empty_line(&mut self) {
        self.out.push('\n');
    }

    pub fn indent<T>(&mut self, f: impl FnOnce(&mut Formatter) -> T) -> T {
        self.depth += 1;
        let r = f(self);
        self.depth -= 1;
        r
    }

    fn open(&mut self, head: &str) {
        if head.is_empty() {
            self.line("{");
        } else {
            self.line(format!("{head} {{"));
        }
    }

    /// `head {`, indented body, `}` followed by `tail`.
    pub fn block<T>(&mut self, head: impl AsRef<str>, tail: &str, f: impl FnOnce(&mut Formatter) -> T) -> T {
        self.open(head.as_ref());
        let r = self.indent(f);
        self.line(format!("}}{tail}"));
        r
    }

    /// Fallible variant of [`Formatter::block`].
    pub fn try_block<T, E>(
        &mut self,
        head: impl AsRef<str>,
        tail: &str,
        f: impl FnOnce(&mut Formatter) -> Result<T, E>,
    ) -> Result<T, E> {
        self.open(head.as_ref());
        self.depth += 1;
        let r = f(self);
        self.depth -= 1;
        self.line(format!("}}{tail}"));
        r
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_blocks_indent_by_two() {
        let mut f = Formatter::new();
        f.block("switch(x)", "", |f| {
            f.line("case 1:");
            f.indent(|f| f.line("break;"));
        });
        assert_eq!(f.finish(), "switch(x) {\n  case 1:\n    break;\n}\n");
    }
}
