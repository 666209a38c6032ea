//! Hard protocol constants.
//!
//! The stack-size and item-size bounds are protocol constants shared by every
//! node, not tunables: changing any of them forks the chain.

/// One GAS in its smallest indivisible unit.
pub const GAS_FACTOR: i64 = 100_000_000;

/// Maximum number of items live across all evaluation stacks of a VM run.
pub const MAX_STACK_SIZE: usize = 2048;

/// Maximum serialized size of a single stack item.
pub const MAX_ITEM_SIZE: usize = 1024 * 1024;

/// Maximum depth of the VM invocation stack.
pub const MAX_INVOCATION_STACK_SIZE: usize = 1024;

/// Maximum nesting of try scopes within one call frame.
pub const MAX_TRY_NESTING_DEPTH: usize = 16;

/// Upper bound on bytes compared during structural equality checks.
pub const MAX_COMPARABLE_SIZE: usize = 65_536;

/// Maximum magnitude of a VM integer in two's-complement bytes.
pub const MAX_INTEGER_SIZE: usize = 32;

/// Maximum byte length of a map key.
pub const MAX_MAP_KEY_SIZE: usize = 64;

/// Maximum size of a deployed script or dynamically loaded script.
pub const MAX_SCRIPT_LENGTH: usize = u16::MAX as usize;

/// Maximum serialized transaction size accepted by verification.
pub const MAX_TRANSACTION_SIZE: usize = 102_400;

/// Maximum number of attributes carried by one transaction.
pub const MAX_TRANSACTION_ATTRIBUTES: usize = 16;

/// Maximum number of signers (and thus witnesses) per transaction.
pub const MAX_TRANSACTION_SIGNERS: usize = 16;

/// Maximum number of sub-items in one witness scope list.
pub const MAX_SUB_ITEMS: usize = 16;

/// Maximum nesting depth of a witness rule condition.
pub const MAX_RULE_NESTING_DEPTH: usize = 2;

/// Maximum byte length of a witness invocation script.
pub const MAX_INVOCATION_SCRIPT: usize = 1024;

/// Maximum byte length of a witness verification script.
pub const MAX_VERIFICATION_SCRIPT: usize = 1024;

/// Gas ceiling for a single witness verification run.
pub const MAX_VERIFICATION_GAS: i64 = GAS_FACTOR / 2;

/// Maximum size of a contract storage key.
pub const MAX_STORAGE_KEY_SIZE: usize = 64;

/// Maximum size of a contract storage value.
pub const MAX_STORAGE_VALUE_SIZE: usize = u16::MAX as usize;

/// Maximum count of public keys in a multi-signature account.
pub const MAX_MULTISIG_KEYS: usize = 1024;

/// Maximum byte length of an oracle response payload.
pub const MAX_ORACLE_RESULT_SIZE: usize = 0xffff;

/// Number of header hashes stored per header-hash-list batch.
pub const HEADER_HASH_BATCH: usize = 2000;

/// Compressed SEC1 public key length.
pub const PUBLIC_KEY_SIZE: usize = 33;

/// Current layout version of the persisted store.
pub const STORAGE_VERSION: &str = "0.3.0";
