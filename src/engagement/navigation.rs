use serde::{Deserialize, Serialize};

use crate::engagement::history::{EntryKind, VisitEntry};

/// An id/name pair for a category or subcategory segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

impl NamedRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// An id/title pair for a guide segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideRef {
    pub id: String,
    pub title: String,
}

/// One breadcrumb in the trail: a label and the logical location it links to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crumb {
    pub label: String,
    pub location: String,
}

/// The guest's current location in the guide, as a single descriptor.
///
/// Not a stack: each navigation replaces the whole value via one of the
/// constructors, so the trail always reflects exactly where the guest is and
/// nothing about how they got there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationPath {
    pub category: Option<NamedRef>,
    pub subcategory: Option<NamedRef>,
    pub guide: Option<GuideRef>,
}

impl NavigationPath {
    /// The home surface.
    pub fn home() -> Self {
        Self::default()
    }

    /// A top-level category.
    pub fn category(category: NamedRef) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    /// A subcategory within a category.
    pub fn subcategory(category: NamedRef, subcategory: NamedRef) -> Self {
        Self {
            category: Some(category),
            subcategory: Some(subcategory),
            guide: None,
        }
    }

    /// A guide, with whatever category context it was opened from.
    pub fn guide(
        category: Option<NamedRef>,
        subcategory: Option<NamedRef>,
        guide: GuideRef,
    ) -> Self {
        Self {
            category,
            subcategory,
            guide: Some(guide),
        }
    }

    /// Where "continue where you left off" should route for a ledger entry.
    ///
    /// The entry's optional context fields rebuild as much of the trail as
    /// was captured. A subcategory entry whose parent context is missing,
    /// or a search entry, degrades to Home rather than erroring.
    pub fn for_entry(entry: &VisitEntry) -> Self {
        let subject = &entry.subject;
        match entry.kind {
            EntryKind::Category => {
                Self::category(NamedRef::new(subject.id.clone(), subject.name.clone()))
            }
            EntryKind::Subcategory => {
                match context_ref(subject.category_id.as_deref(), subject.category_name.as_deref())
                {
                    Some(parent) => Self::subcategory(
                        parent,
                        NamedRef::new(subject.id.clone(), subject.name.clone()),
                    ),
                    None => Self::home(),
                }
            }
            EntryKind::Guide => Self::guide(
                context_ref(subject.category_id.as_deref(), subject.category_name.as_deref()),
                context_ref(
                    subject.subcategory_id.as_deref(),
                    subject.subcategory_name.as_deref(),
                ),
                GuideRef {
                    id: subject.id.clone(),
                    title: subject.name.clone(),
                },
            ),
            EntryKind::Search => Self::home(),
        }
    }

    /// The logical location string, used for screensaver exclusion-prefix
    /// matching: `/`, `/category/{id}`, `/category/{id}/sub/{id}`, with
    /// `/guide/{id}` appended when a guide is open.
    pub fn location(&self) -> String {
        let mut path = String::from("/");
        if let Some(category) = &self.category {
            path = format!("/category/{}", category.id);
            if let Some(subcategory) = &self.subcategory {
                path.push_str(&format!("/sub/{}", subcategory.id));
            }
        }
        if let Some(guide) = &self.guide {
            if path == "/" {
                path.clear();
            }
            path.push_str(&format!("/guide/{}", guide.id));
        }
        path
    }

    /// The breadcrumb trail, always starting at Home.
    pub fn trail(&self) -> Vec<Crumb> {
        let mut crumbs = vec![Crumb {
            label: "Home".to_string(),
            location: "/".to_string(),
        }];

        if let Some(category) = &self.category {
            crumbs.push(Crumb {
                label: category.name.clone(),
                location: format!("/category/{}", category.id),
            });
            if let Some(subcategory) = &self.subcategory {
                crumbs.push(Crumb {
                    label: subcategory.name.clone(),
                    location: format!("/category/{}/sub/{}", category.id, subcategory.id),
                });
            }
        }

        if let Some(guide) = &self.guide {
            crumbs.push(Crumb {
                label: guide.title.clone(),
                location: self.location(),
            });
        }

        crumbs
    }
}

fn context_ref(id: Option<&str>, name: Option<&str>) -> Option<NamedRef> {
    Some(NamedRef::new(id?, name?))
}
