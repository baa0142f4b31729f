//! Marks members who failed to send an expected message as inactive.

use alloc::collections::BTreeSet;

use tracing::warn;

use crate::group::{Group, MemberIndex};

/// Collects the senders of one phase and flushes everyone else from the
/// operating set.
///
/// The filter runs over broadcast input only, so every honest member reaches
/// the same inactive set.
pub struct InactiveMemberFilter<'a> {
    self_index: MemberIndex,
    group: &'a mut Group,
    active: BTreeSet<MemberIndex>,
}

impl<'a> InactiveMemberFilter<'a> {
    /// Create a filter for the given member's group view.
    pub fn new(self_index: MemberIndex, group: &'a mut Group) -> Self {
        Self {
            self_index,
            group,
            active: BTreeSet::new(),
        }
    }

    /// Record that the member sent the expected message.
    pub fn mark_member_as_active(&mut self, member: MemberIndex) {
        self.active.insert(member);
    }

    /// Mark every operating member that was not recorded as active as
    /// inactive. The filtering member is never marked.
    pub fn flush_inactive_members(self) {
        for member in self.group.operating_member_ids() {
            if member != self.self_index && !self.active.contains(&member) {
                warn!(
                    member = %self.self_index,
                    inactive = %member,
                    "marking member as inactive"
                );
                self.group.mark_member_as_inactive(member);
            }
        }
    }
}

/// Mark every operating member absent from `senders` as inactive.
pub fn mark_inactive_members(
    self_index: MemberIndex,
    group: &mut Group,
    senders: impl IntoIterator<Item = MemberIndex>,
) {
    let mut filter = InactiveMemberFilter::new(self_index, group);
    for sender in senders {
        filter.mark_member_as_active(sender);
    }
    filter.flush_inactive_members();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(i: u8) -> MemberIndex {
        MemberIndex::new(i).unwrap()
    }

    #[test]
    fn flushes_silent_members() {
        let mut group = Group::new(2, 5).unwrap();
        mark_inactive_members(index(1), &mut group, [index(2), index(4)]);

        assert_eq!(group.inactive_member_ids(), vec![index(3), index(5)]);
        assert!(group.is_operating(index(1)));
    }

    #[test]
    fn keeps_disqualification() {
        let mut group = Group::new(2, 5).unwrap();
        group.mark_member_as_disqualified(index(3));

        let mut filter = InactiveMemberFilter::new(index(2), &mut group);
        filter.mark_member_as_active(index(1));
        filter.mark_member_as_active(index(4));
        filter.mark_member_as_active(index(5));
        filter.flush_inactive_members();

        assert_eq!(group.disqualified_member_ids(), vec![index(3)]);
        assert!(group.inactive_member_ids().is_empty());
    }
}
