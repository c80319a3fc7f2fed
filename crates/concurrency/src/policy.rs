//! Write policy resolution
//!
//! Maps an entity's version state and the requested write mode onto the
//! storage-level precondition and bin mode.
//!
//! | Mode | Versioned, unset | Versioned, `v > 0` | Unversioned |
//! |------|------------------|--------------------|-------------|
//! | `Save` | `MustNotExist` | `ExpectGeneration(v)` | `None` |
//! | `Insert` | `MustNotExist` | `MustNotExist` | `MustNotExist` |
//! | `Update` | local `VersionNotSet` | `ExpectGeneration(v)` | `MustExist` |
//! | `Persist(action)` | from `action` | from `action` | from `action` |
//!
//! Every mode except `Persist` replaces all bins. `Persist` takes the bin
//! mode from its record-exists action.

use recmap_core::{
    BinMode, Generation, Key, OperationKind, PreconditionError, RecordExistsAction,
    VersionPolicy,
};

/// How an entity write treats an existing record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Versioned compare-and-set, or full overwrite when unversioned
    Save,
    /// Create only
    Insert,
    /// Existing record only
    Update,
    /// Explicit record-exists action, version ignored
    Persist(RecordExistsAction),
}

impl WriteMode {
    /// Operation kind reported in errors and logs
    pub fn operation(self) -> OperationKind {
        match self {
            WriteMode::Save => OperationKind::Save,
            WriteMode::Insert => OperationKind::Insert,
            WriteMode::Update => OperationKind::Update,
            WriteMode::Persist(_) => OperationKind::Persist,
        }
    }
}

/// Precondition and bin mode for one write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPolicy {
    /// Existence/generation precondition
    pub version: VersionPolicy,
    /// Bin combination mode
    pub bin_mode: BinMode,
}

/// Resolve the write policy for an entity
///
/// `version` is the entity's current version: `None` for unversioned
/// types, `Some(0)` when never persisted.
pub fn resolve(
    mode: WriteMode,
    version: Option<Generation>,
    key: &Key,
) -> Result<ResolvedPolicy, PreconditionError> {
    let replace = |version| ResolvedPolicy {
        version,
        bin_mode: BinMode::Replace,
    };
    let resolved = match (mode, version) {
        (WriteMode::Save, None) => replace(VersionPolicy::None),
        (WriteMode::Save, Some(0)) => replace(VersionPolicy::MustNotExist),
        (WriteMode::Save, Some(v)) => replace(VersionPolicy::ExpectGeneration(v)),
        (WriteMode::Insert, _) => replace(VersionPolicy::MustNotExist),
        (WriteMode::Update, None) => replace(VersionPolicy::MustExist),
        (WriteMode::Update, Some(0)) => {
            return Err(PreconditionError::VersionNotSet {
                key: key.to_string(),
            })
        }
        (WriteMode::Update, Some(v)) => replace(VersionPolicy::ExpectGeneration(v)),
        (WriteMode::Persist(action), _) => {
            let (version, bin_mode) = action.to_policy();
            ResolvedPolicy { version, bin_mode }
        }
    };
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key() -> Key {
        Key::new("test", "people", "p1")
    }

    fn version_of(mode: WriteMode, version: Option<Generation>) -> VersionPolicy {
        resolve(mode, version, &key()).unwrap().version
    }

    #[test]
    fn test_save() {
        assert_eq!(version_of(WriteMode::Save, None), VersionPolicy::None);
        assert_eq!(version_of(WriteMode::Save, Some(0)), VersionPolicy::MustNotExist);
        assert_eq!(version_of(WriteMode::Save, Some(3)), VersionPolicy::ExpectGeneration(3));
    }

    #[test]
    fn test_insert_ignores_version() {
        for version in [None, Some(0), Some(7)] {
            assert_eq!(version_of(WriteMode::Insert, version), VersionPolicy::MustNotExist);
        }
    }

    #[test]
    fn test_update() {
        assert_eq!(version_of(WriteMode::Update, None), VersionPolicy::MustExist);
        assert_eq!(version_of(WriteMode::Update, Some(2)), VersionPolicy::ExpectGeneration(2));

        let err = resolve(WriteMode::Update, Some(0), &key()).unwrap_err();
        assert_eq!(
            err,
            PreconditionError::VersionNotSet {
                key: "test:people:p1".to_string()
            }
        );
    }

    #[test]
    fn test_persist_uses_action() {
        let resolved = resolve(
            WriteMode::Persist(RecordExistsAction::UpdateOnly),
            Some(4),
            &key(),
        )
        .unwrap();
        assert_eq!(resolved.version, VersionPolicy::MustExist);
        assert_eq!(resolved.bin_mode, BinMode::Merge);
    }

    #[test]
    fn test_full_overwrite_modes_replace() {
        for mode in [WriteMode::Save, WriteMode::Insert, WriteMode::Update] {
            let resolved = resolve(mode, Some(1), &key()).unwrap();
            assert_eq!(resolved.bin_mode, BinMode::Replace);
        }
    }

    fn actions() -> impl Strategy<Value = RecordExistsAction> {
        prop_oneof![
            Just(RecordExistsAction::Update),
            Just(RecordExistsAction::UpdateOnly),
            Just(RecordExistsAction::Replace),
            Just(RecordExistsAction::ReplaceOnly),
            Just(RecordExistsAction::CreateOnly),
        ]
    }

    proptest! {
        #[test]
        fn prop_saved_version_is_expected_generation(v in 1u32..) {
            prop_assert_eq!(version_of(WriteMode::Save, Some(v)), VersionPolicy::ExpectGeneration(v));
            prop_assert_eq!(version_of(WriteMode::Update, Some(v)), VersionPolicy::ExpectGeneration(v));
        }

        #[test]
        fn prop_persist_ignores_version(action in actions(), v in proptest::option::of(any::<u32>())) {
            let resolved = resolve(WriteMode::Persist(action), v, &key()).unwrap();
            prop_assert_eq!((resolved.version, resolved.bin_mode), action.to_policy());
        }
    }
}
