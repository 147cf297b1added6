use crate::event::{AuthorAssociation, Event};

/// Whether the event's author may trigger bots.
///
/// For PR lifecycle events this is the PR author; for comments, reviews and
/// issues it is whoever wrote them, never the PR author.
pub fn is_trusted(event: &Event) -> bool {
    is_trusted_association(event.association())
}

pub fn is_trusted_association(association: AuthorAssociation) -> bool {
    matches!(
        association,
        AuthorAssociation::Owner | AuthorAssociation::Collaborator | AuthorAssociation::Member
    )
}
