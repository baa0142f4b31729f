//! Group membership bookkeeping.
//!
//! Every member keeps its own [`Group`] view and mutates it only as a result
//! of deterministic rules applied to broadcast messages, so honest members
//! converge on the same disqualified and inactive sets.

use alloc::collections::{BTreeMap, BTreeSet};
use core::fmt::{self, Display};

use itertools::Itertools;

use crate::{Ciphersuite, Error, Field, Scalar};

/// A 1-based index of a member in the group, in `[1, 255]`.
///
/// On the wire the index is encoded as a `u32` and validated on decode, so
/// out-of-range values are rejected instead of truncated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MemberIndex(u8);

impl MemberIndex {
    /// The largest valid member index.
    pub const MAX: u8 = 255;

    /// Create a new member index, failing for zero.
    pub fn new(index: u8) -> Result<Self, Error> {
        if index == 0 {
            Err(Error::InvalidMemberIndex(0))
        } else {
            Ok(Self(index))
        }
    }

    /// The index as an integer.
    pub fn get(&self) -> u8 {
        self.0
    }

    /// The index as a scalar, the point at which this member's shares are
    /// evaluated.
    pub fn to_scalar<C: Ciphersuite>(&self) -> Scalar<C> {
        let one = <<C::Group as crate::Group>::Field>::one();
        let mut sum = <<C::Group as crate::Group>::Field>::zero();
        // Double-and-add over the bits of the index.
        for bit in (0..8).rev() {
            sum = sum + sum;
            if self.0 >> bit & 1 == 1 {
                sum = sum + one;
            }
        }
        sum
    }
}

impl TryFrom<u32> for MemberIndex {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(index) if index > 0 => Ok(Self(index)),
            _ => Err(Error::InvalidMemberIndex(value)),
        }
    }
}

impl TryFrom<u8> for MemberIndex {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MemberIndex> for u32 {
    fn from(index: MemberIndex) -> Self {
        index.0 as u32
    }
}

impl Display for MemberIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The local view of a group executing the protocol.
///
/// Tracks the group size, the dishonest threshold and which members were
/// disqualified (proven misbehavior) or marked inactive (missing messages).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    group_size: u8,
    dishonest_threshold: u8,
    disqualified: BTreeSet<MemberIndex>,
    inactive: BTreeSet<MemberIndex>,
}

impl Group {
    /// Create a new group with every member operating.
    pub fn new(dishonest_threshold: u8, group_size: u8) -> Result<Self, Error> {
        if group_size == 0 {
            return Err(Error::InvalidGroupSize);
        }
        if dishonest_threshold >= group_size {
            return Err(Error::InvalidHonestThreshold);
        }
        Ok(Self {
            group_size,
            dishonest_threshold,
            disqualified: BTreeSet::new(),
            inactive: BTreeSet::new(),
        })
    }

    /// Number of members in the group, `n`.
    pub fn group_size(&self) -> usize {
        self.group_size as usize
    }

    /// Maximum number of misbehaving members, `t`.
    pub fn dishonest_threshold(&self) -> usize {
        self.dishonest_threshold as usize
    }

    /// Minimum number of honest members, `n - t`.
    pub fn honest_threshold(&self) -> usize {
        self.group_size() - self.dishonest_threshold()
    }

    /// All member indices of the group, `1..=n`.
    pub fn member_ids(&self) -> impl Iterator<Item = MemberIndex> {
        (1..=self.group_size).map(MemberIndex)
    }

    /// Whether the index belongs to the group.
    pub fn is_in_group(&self, member: MemberIndex) -> bool {
        member.0 <= self.group_size
    }

    /// Whether the member is neither disqualified nor inactive.
    pub fn is_operating(&self, member: MemberIndex) -> bool {
        self.is_in_group(member) && !self.is_disqualified(member) && !self.is_inactive(member)
    }

    /// Whether the member was disqualified.
    pub fn is_disqualified(&self, member: MemberIndex) -> bool {
        self.disqualified.contains(&member)
    }

    /// Whether the member was marked inactive.
    pub fn is_inactive(&self, member: MemberIndex) -> bool {
        self.inactive.contains(&member)
    }

    /// Disqualify an operating member. Members that are already disqualified
    /// or inactive keep their classification.
    pub fn mark_member_as_disqualified(&mut self, member: MemberIndex) {
        if self.is_operating(member) {
            self.disqualified.insert(member);
        }
    }

    /// Mark an operating member as inactive. Members that are already
    /// disqualified or inactive keep their classification.
    pub fn mark_member_as_inactive(&mut self, member: MemberIndex) {
        if self.is_operating(member) {
            self.inactive.insert(member);
        }
    }

    /// Operating members, in ascending order.
    pub fn operating_member_ids(&self) -> Vec<MemberIndex> {
        self.member_ids().filter(|m| self.is_operating(*m)).collect()
    }

    /// Disqualified members, in ascending order.
    pub fn disqualified_member_ids(&self) -> Vec<MemberIndex> {
        self.disqualified.iter().copied().collect()
    }

    /// Inactive members, in ascending order.
    pub fn inactive_member_ids(&self) -> Vec<MemberIndex> {
        self.inactive.iter().copied().collect()
    }

    /// Disqualified and inactive members, in ascending order.
    pub fn misbehaved_member_ids(&self) -> Vec<MemberIndex> {
        self.disqualified
            .iter()
            .merge(self.inactive.iter())
            .dedup()
            .copied()
            .collect()
    }
}

/// Validates that the sender of a message is the operator selected for the
/// member index it claims.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MembershipValidator {
    operators: BTreeMap<MemberIndex, Vec<u8>>,
}

impl MembershipValidator {
    /// Create a validator from the selected operators' public keys. The
    /// operator at position `i` holds member index `i + 1`.
    pub fn new(operator_public_keys: Vec<Vec<u8>>) -> Result<Self, Error> {
        if operator_public_keys.is_empty() || operator_public_keys.len() > MemberIndex::MAX as usize
        {
            return Err(Error::InvalidGroupSize);
        }
        let operators = operator_public_keys
            .into_iter()
            .enumerate()
            .map(|(i, key)| (MemberIndex((i + 1) as u8), key))
            .collect();
        Ok(Self { operators })
    }

    /// Whether `public_key` belongs to the operator holding `member`.
    pub fn is_valid_membership(&self, member: MemberIndex, public_key: &[u8]) -> bool {
        self.operators
            .get(&member)
            .is_some_and(|expected| expected.as_slice() == public_key)
    }

    /// The public key of the operator holding `member`.
    pub fn operator_public_key(&self, member: MemberIndex) -> Option<&[u8]> {
        self.operators.get(&member).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(i: u8) -> MemberIndex {
        MemberIndex::new(i).unwrap()
    }

    #[test]
    fn member_index_range() {
        assert_eq!(MemberIndex::try_from(0u32), Err(Error::InvalidMemberIndex(0)));
        assert_eq!(MemberIndex::try_from(256u32), Err(Error::InvalidMemberIndex(256)));
        assert_eq!(MemberIndex::try_from(255u32).map(|m| m.get()), Ok(255));
        assert_eq!(u32::from(index(7)), 7);
    }

    #[test]
    fn operating_members() {
        let mut group = Group::new(2, 5).unwrap();
        assert_eq!(group.honest_threshold(), 3);
        assert_eq!(group.operating_member_ids().len(), 5);

        group.mark_member_as_disqualified(index(2));
        group.mark_member_as_inactive(index(4));
        // First classification wins.
        group.mark_member_as_inactive(index(2));
        group.mark_member_as_disqualified(index(4));
        // Outside of the group.
        group.mark_member_as_disqualified(index(6));

        assert_eq!(
            group.operating_member_ids(),
            vec![index(1), index(3), index(5)]
        );
        assert_eq!(group.disqualified_member_ids(), vec![index(2)]);
        assert_eq!(group.inactive_member_ids(), vec![index(4)]);
        assert_eq!(group.misbehaved_member_ids(), vec![index(2), index(4)]);
        assert!(!group.is_operating(index(6)));
    }

    #[test]
    fn invalid_group() {
        assert_eq!(Group::new(0, 0), Err(Error::InvalidGroupSize));
        assert_eq!(Group::new(3, 3), Err(Error::InvalidHonestThreshold));
    }

    #[test]
    fn membership_validation() {
        let validator = MembershipValidator::new(vec![vec![1], vec![2], vec![3]]).unwrap();
        assert!(validator.is_valid_membership(index(2), &[2]));
        assert!(!validator.is_valid_membership(index(2), &[3]));
        assert!(!validator.is_valid_membership(index(4), &[4]));
    }
}
