use std::ops::Range;

/// Byte offset <-> 1-based line number lookups over one source string.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(pos, _)| pos + 1));
        LineIndex {
            starts,
            len: source.len(),
        }
    }

    pub fn line_count(&self) -> u32 {
        self.starts.len() as u32
    }

    /// 1-based line containing `offset`.
    pub fn line_of(&self, offset: usize) -> u32 {
        self.starts.partition_point(|&start| start <= offset) as u32
    }

    /// Byte offset where `line` (1-based) starts; end of input past the last line.
    pub fn line_start(&self, line: u32) -> usize {
        if line == 0 {
            return 0;
        }
        self.starts
            .get(line as usize - 1)
            .copied()
            .unwrap_or(self.len)
    }

    /// Byte range of `line` without its trailing newline.
    pub fn line_range(&self, line: u32) -> Range<usize> {
        let start = self.line_start(line);
        let end = match self.starts.get(line as usize) {
            Some(&next) => next - 1,
            None => self.len,
        };
        start..end.max(start)
    }

    /// Byte range covering lines `first..=last`, including the final newline.
    pub fn lines_range(&self, first: u32, last: u32) -> Range<usize> {
        self.line_start(first)..self.line_start(last + 1)
    }
}
