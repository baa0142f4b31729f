//! Protocol parameters provided by the ledger.

use crate::{group::MemberIndex, Error};

/// Parameters of one DKG execution.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Number of members in the group, `n`.
    pub group_size: usize,
    /// Minimum number of honest members, `n - t`.
    pub honest_threshold: usize,
    /// Blocks between the submission slots of consecutive members.
    pub result_publication_block_step: u64,
}

impl Config {
    /// Create a new configuration and validate it.
    pub fn new(
        group_size: usize,
        honest_threshold: usize,
        result_publication_block_step: u64,
    ) -> Result<Self, Error> {
        let config = Self {
            group_size,
            honest_threshold,
            result_publication_block_step,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check `1 <= honest_threshold <= group_size <= 255` and a non-zero
    /// block step.
    pub fn validate(&self) -> Result<(), Error> {
        if self.group_size == 0 || self.group_size > MemberIndex::MAX as usize {
            return Err(Error::InvalidGroupSize);
        }
        if self.honest_threshold == 0 || self.honest_threshold > self.group_size {
            return Err(Error::InvalidHonestThreshold);
        }
        if self.result_publication_block_step == 0 {
            return Err(Error::InvalidBlockStep);
        }
        Ok(())
    }

    /// Maximum number of misbehaving members, `t = n - h`.
    pub fn dishonest_threshold(&self) -> usize {
        self.group_size - self.honest_threshold
    }

    /// Number of result signatures required for a submission.
    pub fn signature_threshold(&self) -> usize {
        self.honest_threshold + (self.group_size - self.honest_threshold) / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_thresholds() {
        let config = Config::new(64, 33, 4).unwrap();
        assert_eq!(config.dishonest_threshold(), 31);
        assert_eq!(config.signature_threshold(), 48);

        let config = Config::new(5, 3, 1).unwrap();
        assert_eq!(config.dishonest_threshold(), 2);
        assert_eq!(config.signature_threshold(), 4);
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(Config::new(0, 0, 1), Err(Error::InvalidGroupSize));
        assert_eq!(Config::new(256, 100, 1), Err(Error::InvalidGroupSize));
        assert_eq!(Config::new(5, 0, 1), Err(Error::InvalidHonestThreshold));
        assert_eq!(Config::new(5, 6, 1), Err(Error::InvalidHonestThreshold));
        assert_eq!(Config::new(5, 3, 0), Err(Error::InvalidBlockStep));
    }

    #[test]
    fn json_round_trip() {
        let json = r#"{"group_size":6,"honest_threshold":3,"result_publication_block_step":2}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config, Config::new(6, 3, 2).unwrap());
        assert!(serde_json::from_str::<Config>(r#"{"group_size":6}"#).is_err());
    }
}
