use serde::{Deserialize, Serialize};

macro_rules! address_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

address_newtype!(WalletAddress);
address_newtype!(ProgramId);
address_newtype!(TransactionSignature);

/// One immutable (link, submitter) pair on the shared record.
/// Ordering is remote append order and is the only display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub link: String,
    pub submitter: WalletAddress,
}
