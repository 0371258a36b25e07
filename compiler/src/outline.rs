use ssm::document::{Difficulty, LineSpan};
use ssm::{ChapterCode, Document};

/// What later stages need to know about one chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterInfo {
    pub code: ChapterCode,
    pub number: u32,
    pub title: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub span: LineSpan,
    pub content_hash: String,
}

/// Chapters in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outline {
    chapters: Vec<ChapterInfo>,
}

impl Outline {
    pub fn from_document(document: &Document) -> Self {
        Outline {
            chapters: document
                .chapters
                .iter()
                .map(|c| ChapterInfo {
                    code: c.code.clone(),
                    number: c.number,
                    title: c.title.clone(),
                    difficulty: c.difficulty,
                    span: c.span,
                    content_hash: c.content_hash.clone(),
                })
                .collect(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChapterInfo> {
        self.chapters.iter()
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn get(&self, code: &ChapterCode) -> Option<&ChapterInfo> {
        self.chapters.iter().find(|c| &c.code == code)
    }

    pub fn contains(&self, code: &ChapterCode) -> bool {
        self.get(code).is_some()
    }

    /// Canonical chapter rank: document-global first, then document order,
    /// unknown codes last.
    pub fn rank(&self, code: Option<&ChapterCode>) -> usize {
        match code {
            None => 0,
            Some(code) => self
                .chapters
                .iter()
                .position(|c| &c.code == code)
                .map(|pos| pos + 1)
                .unwrap_or(usize::MAX),
        }
    }

    /// Previous and next chapter codes.
    pub fn neighbours(&self, code: &ChapterCode) -> (Option<ChapterCode>, Option<ChapterCode>) {
        let Some(pos) = self.chapters.iter().position(|c| &c.code == code) else {
            return (None, None);
        };
        let prev = pos.checked_sub(1).map(|p| self.chapters[p].code.clone());
        let next = self.chapters.get(pos + 1).map(|c| c.code.clone());
        (prev, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssm::{Diagnostics, Parser};

    #[test]
    fn rank_and_neighbours() {
        let mut diagnostics = Diagnostics::new();
        let doc = Parser::new("# Chapter 1: A\n\n# Chapter 2: B\n\n# Chapter 3: C\n")
            .parse(&mut diagnostics)
            .unwrap();
        let outline = Outline::from_document(&doc);
        let ch = ChapterCode::from_number;

        assert_eq!(outline.rank(None), 0);
        assert_eq!(outline.rank(Some(&ch(2))), 2);
        assert_eq!(outline.rank(Some(&ch(9))), usize::MAX);
        assert_eq!(outline.neighbours(&ch(1)), (None, Some(ch(2))));
        assert_eq!(outline.neighbours(&ch(2)), (Some(ch(1)), Some(ch(3))));
        assert_eq!(outline.neighbours(&ch(3)), (Some(ch(2)), None));
    }
}
