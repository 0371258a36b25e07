use std::cmp::Reverse;

use ssm::{Block, BlockId, BlockKind, ChapterCode};

use super::{Pass, PassContext};
use crate::capability::Capability;
use crate::error::PassError;

const HUB_COUNT: usize = 3;

/// Chapter digest: key terms, concepts, the most linked blocks, and the
/// reading pathway around the chapter, stored on the chapter's `chapter-meta`.
///
/// Chapters holding relations also get a `summary` block listing them, so a
/// chapter of plain prose gains no extra blocks. Relies on links from
/// `bidirectional-links` to rank hubs. Re-running rewrites in place.
pub struct ChapterSummary;

impl Capability for ChapterSummary {
    fn name(&self) -> &'static str {
        "chapter-summary"
    }
}

struct Digest {
    heading: String,
    relations: Vec<String>,
    extra: Vec<(&'static str, String)>,
    hubs: Vec<BlockId>,
    chapter_meta: Option<BlockId>,
}

impl Pass for ChapterSummary {
    fn run(&self, cx: &mut PassContext<'_>) -> Result<(), PassError> {
        for code in cx.live_chapters() {
            let digest = digest(cx, &code);

            if let Some(meta) = digest.chapter_meta.as_ref().and_then(|id| cx.blocks.get_mut(id)) {
                meta.set_meta("summary", digest.heading.clone());
                for (key, value) in &digest.extra {
                    if value.is_empty() {
                        meta.extra.remove(*key);
                    } else {
                        meta.set_meta(key, value.clone());
                    }
                }
                meta.links.extend(digest.hubs.iter().cloned());
            }

            let existing = cx
                .blocks
                .iter()
                .position(|b| matches!(b.kind, BlockKind::Summary) && b.chapter.as_ref() == Some(&code));
            if digest.relations.is_empty() {
                if existing.is_some() {
                    cx.blocks
                        .retain(|b| !(matches!(b.kind, BlockKind::Summary) && b.chapter.as_ref() == Some(&code)));
                }
                continue;
            }

            let span = cx.outline.get(&code).map(|c| c.span);
            let block = match existing {
                Some(pos) => &mut cx.blocks.blocks_mut()[pos],
                None => {
                    let block = cx.derive(BlockKind::Summary, "", Some(code.clone())).at_lines(span);
                    cx.blocks.push(block);
                    let last = cx.blocks.len() - 1;
                    &mut cx.blocks.blocks_mut()[last]
                }
            };
            let mut body = vec![digest.heading];
            body.extend(digest.relations);
            block.body = body.join("\n");
            for (key, value) in digest.extra {
                if value.is_empty() {
                    block.extra.remove(key);
                } else {
                    block.set_meta(key, value);
                }
            }
            block.links = digest.chapter_meta.into_iter().chain(digest.hubs).collect();
        }
        Ok(())
    }
}

fn digest(cx: &PassContext<'_>, code: &ChapterCode) -> Digest {
    let mut members: Vec<&Block> = cx
        .blocks
        .iter()
        .filter(|b| b.chapter.as_ref() == Some(code))
        .collect();
    members.sort_by_key(|b| b.index);

    let key_terms = distinct_names(&members, |kind| match kind {
        BlockKind::Term { name } => Some(name),
        _ => None,
    });
    let concepts = distinct_names(&members, |kind| match kind {
        BlockKind::Concept { title } => Some(title),
        _ => None,
    });

    let mut hubs: Vec<&Block> = members
        .iter()
        .copied()
        .filter(|b| b.id.is_some() && !b.links.is_empty())
        .filter(|b| !matches!(b.kind, BlockKind::ChapterMeta { .. } | BlockKind::Summary))
        .collect();
    hubs.sort_by_key(|b| (Reverse(b.links.len()), b.index));
    let hubs: Vec<BlockId> = hubs.into_iter().take(HUB_COUNT).filter_map(|b| b.id.clone()).collect();

    // Chapters this one's relations point into.
    let mut prerequisites: Vec<&ChapterCode> = members
        .iter()
        .filter_map(|b| b.relation())
        .flat_map(|r| [&r.from, &r.to])
        .filter_map(|id| cx.blocks.get(id).and_then(|b| b.chapter.as_ref()))
        .filter(|c| *c != code)
        .collect();
    prerequisites.sort_by_key(|c| cx.outline.rank(Some(*c)));
    prerequisites.dedup();

    let relations: Vec<String> = members
        .iter()
        .filter_map(|b| b.relation())
        .map(|r| {
            let name = |id: &BlockId| {
                cx.blocks
                    .get(id)
                    .map(|b| b.salient())
                    .unwrap_or_else(|| id.to_string())
            };
            format!("{} {} {}.", name(&r.from), r.relation_type, name(&r.to))
        })
        .collect();

    let (prev, next) = cx.outline.neighbours(code);
    let info = cx.outline.get(code);
    let mut heading = match info.and_then(|c| c.title.as_deref()) {
        Some(title) => format!("Chapter {}: {}.", info.map_or(0, |c| c.number), title),
        None => format!("Chapter {}.", info.map_or(0, |c| c.number)),
    };
    if !key_terms.is_empty() {
        heading.push_str(&format!(" Key terms: {}.", key_terms));
    }
    if !concepts.is_empty() {
        heading.push_str(&format!(" Concepts: {}.", concepts));
    }

    let chapter_meta = members
        .iter()
        .find(|b| matches!(b.kind, BlockKind::ChapterMeta { .. }))
        .and_then(|b| b.id.clone());
    let join_ids = |ids: &[BlockId]| ids.iter().map(BlockId::as_str).collect::<Vec<_>>().join(", ");

    Digest {
        heading,
        relations,
        extra: vec![
            ("key_terms", key_terms),
            ("concepts", concepts),
            ("hubs", join_ids(&hubs)),
            ("prev", prev.map(|c| c.to_string()).unwrap_or_default()),
            ("next", next.map(|c| c.to_string()).unwrap_or_default()),
            (
                "prerequisites",
                prerequisites.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", "),
            ),
        ],
        hubs,
        chapter_meta,
    }
}

/// Names picked from `members`, first spelling kept, joined with commas.
fn distinct_names(members: &[&Block], pick: impl Fn(&BlockKind) -> Option<&String>) -> String {
    let mut names: Vec<&str> = Vec::new();
    for name in members.iter().filter_map(|b| pick(&b.kind)) {
        if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            names.push(name);
        }
    }
    names.join(", ")
}
