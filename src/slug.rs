use std::collections::BTreeSet;

use crate::curriculum::{ItemType, PlayerItem};

/// Lower-cases `title`, turns every run of characters outside `[a-z0-9]`
/// into one hyphen and trims hyphens from both ends.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_sep = false;
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// A player location expressed as URL path segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerRoute {
    Lesson { module_slug: String, lesson_slug: String },
    Assessment { module_slug: String, assessment_slug: String },
    FinalExam { slug: String },
}

impl PlayerRoute {
    /// Parses path segments in priority order: module lesson, module
    /// assessment, then a bare final exam. Empty segments are ignored.
    pub fn parse<S: AsRef<str>>(segments: &[S]) -> Option<PlayerRoute> {
        let segs: Vec<&str> = segments
            .iter()
            .map(AsRef::as_ref)
            .filter(|s| !s.is_empty())
            .collect();
        match segs.as_slice() {
            ["module", m, "lesson", l] => Some(PlayerRoute::Lesson {
                module_slug: m.to_string(),
                lesson_slug: l.to_string(),
            }),
            ["module", m, "assessment", a] => Some(PlayerRoute::Assessment {
                module_slug: m.to_string(),
                assessment_slug: a.to_string(),
            }),
            ["assessment", f] => Some(PlayerRoute::FinalExam { slug: f.to_string() }),
            _ => None,
        }
    }

    pub fn for_item(item: &PlayerItem) -> Option<PlayerRoute> {
        match (item.kind, &item.module_slug) {
            (ItemType::Lesson, Some(m)) => Some(PlayerRoute::Lesson {
                module_slug: m.clone(),
                lesson_slug: item.slug.clone(),
            }),
            (ItemType::Assessment, Some(m)) => Some(PlayerRoute::Assessment {
                module_slug: m.clone(),
                assessment_slug: item.slug.clone(),
            }),
            (ItemType::FinalExam, _) => Some(PlayerRoute::FinalExam {
                slug: item.slug.clone(),
            }),
            _ => None,
        }
    }

    pub fn to_path(&self) -> String {
        match self {
            PlayerRoute::Lesson { module_slug, lesson_slug } => {
                format!("module/{}/lesson/{}", module_slug, lesson_slug)
            }
            PlayerRoute::Assessment { module_slug, assessment_slug } => {
                format!("module/{}/assessment/{}", module_slug, assessment_slug)
            }
            PlayerRoute::FinalExam { slug } => format!("assessment/{}", slug),
        }
    }

    fn matches(&self, item: &PlayerItem) -> bool {
        let module = item.module_slug.as_deref();
        match self {
            PlayerRoute::Lesson { module_slug, lesson_slug } => {
                item.kind == ItemType::Lesson
                    && module == Some(module_slug.as_str())
                    && item.slug == *lesson_slug
            }
            PlayerRoute::Assessment { module_slug, assessment_slug } => {
                item.kind == ItemType::Assessment
                    && module == Some(module_slug.as_str())
                    && item.slug == *assessment_slug
            }
            PlayerRoute::FinalExam { slug } => {
                item.kind == ItemType::FinalExam && item.slug == *slug
            }
        }
    }
}

/// Canonical path (relative to the course's player root) for `item`.
pub fn canonical_path(item: &PlayerItem) -> Option<String> {
    PlayerRoute::for_item(item).map(|r| r.to_path())
}

/// First item matching `route`; colliding slugs resolve to the earliest item.
pub fn resolve<'a>(items: &'a [PlayerItem], route: &PlayerRoute) -> Option<&'a PlayerItem> {
    items.iter().find(|item| route.matches(item))
}

/// Where a bare player URL sends the learner: the last completed lesson in
/// traversal order, otherwise the first item.
pub fn redirect_target<'a>(
    items: &'a [PlayerItem],
    completed_lesson_ids: &BTreeSet<String>,
) -> Option<&'a PlayerItem> {
    items
        .iter()
        .rev()
        .find(|item| item.is_lesson() && completed_lesson_ids.contains(&item.id))
        .or_else(|| items.first())
}
