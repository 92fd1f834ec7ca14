//! Pre-shared token table, version 1.
//!
//! A fixed ordered list of frequently-sent strings: both peers reference
//! them by byte index instead of spelling them out. Reordering this table
//! is a protocol break, so it is a `const` array, never built at runtime.

pub const TOKEN_TABLE_V1: &[&str] = &[
    "org.wildfly.httpclient.returnedKeys",
    "jboss.source.address",
    "Affinity.NONE",
    "Affinity.LOCAL",
    "NodeAffinity",
    "ClusterAffinity",
    "java.lang.String",
    "java.lang.Integer",
    "java.lang.Long",
    "java.lang.Boolean",
    "javax.naming.NameNotFoundException",
    "javax.naming.NamingException",
    "jakarta.ejb.NoSuchEJBException",
    "jakarta.ejb.NoSuchMethodException",
    "jakarta.ejb.EJBException",
    "jakarta.transaction.xa.Xid",
];

const MAX_TOKEN_INDEX: usize = u8::MAX as usize;

pub fn token_index(value: &str) -> Option<u8> {
    if TOKEN_TABLE_V1.len() > MAX_TOKEN_INDEX {
        return None;
    }
    TOKEN_TABLE_V1.iter().position(|candidate| *candidate == value).map(|idx| idx as u8)
}

pub fn token_at(index: u8) -> Option<&'static str> {
    TOKEN_TABLE_V1.get(index as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_entry_resolves_back_to_its_index() {
        for (idx, token) in TOKEN_TABLE_V1.iter().enumerate() {
            assert_eq!(token_index(token), Some(idx as u8));
            assert_eq!(token_at(idx as u8), Some(*token));
        }
    }

    #[test]
    fn unknown_string_has_no_token() {
        assert_eq!(token_index("not.in.the.table"), None);
    }
}
