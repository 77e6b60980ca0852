// ABOUTME: Order-independent content checksum over table rows
// ABOUTME: Folds 64-bit md5 prefixes with wrapping addition and builds the matching SQL

use anyhow::{bail, Context, Result};

/// Alias given to the scanned table so the whole row can be cast to text.
/// A column with the same name would shadow the row reference.
pub(crate) const ROW_ALIAS: &str = "__fingerprint_row";

/// Running checksum: the wrapping sum of every row's digest prefix
///
/// Addition is commutative, so the result does not depend on the order in
/// which rows are fed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentChecksum {
    value: i64,
    rows: i64,
}

impl ContentChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one row, given its hex md5 digest
    pub fn add_digest(&mut self, hex_digest: &str) -> Result<()> {
        let prefix = digest_prefix(hex_digest)?;
        self.add_prefix(prefix);
        Ok(())
    }

    pub fn add_prefix(&mut self, prefix: i64) {
        self.value = self.value.wrapping_add(prefix);
        self.rows += 1;
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn rows(&self) -> i64 {
        self.rows
    }
}

/// Interpret the first 16 hex digits (64 bits) of a digest as a signed integer
///
/// Matches PostgreSQL's `('x' || substr(digest, 1, 16))::bit(64)::bigint`.
///
/// # Examples
///
/// ```
/// # use pg_upgrade_verifier::snapshot::digest_prefix;
/// assert_eq!(digest_prefix("0000000000000001ffffffffffffffff").unwrap(), 1);
/// assert_eq!(digest_prefix("ffffffffffffffff0000000000000000").unwrap(), -1);
/// ```
pub fn digest_prefix(hex_digest: &str) -> Result<i64> {
    let prefix = hex_digest
        .get(..16)
        .with_context(|| format!("Digest '{}' is shorter than 16 hex digits", hex_digest))?;
    let unsigned = u64::from_str_radix(prefix, 16)
        .with_context(|| format!("Digest '{}' is not hexadecimal", hex_digest))?;
    Ok(unsigned as i64)
}

/// Fold the server's numeric sum (already reduced modulo 2^64) into the
/// wrapping `i64` sum
///
/// PostgreSQL sums `bigint` into `numeric`, so the raw total never overflows.
/// Any integer congruent to the wrapping sum modulo 2^64 truncates to the
/// same low 64 bits.
pub fn fold_numeric_sum(numeric: &str) -> Result<i64> {
    let trimmed = numeric.trim();
    let integral = match trimmed.split_once('.') {
        Some((integral, fraction)) if fraction.chars().all(|c| c == '0') => integral,
        Some(_) => bail!("Checksum sum '{}' is not an integer", trimmed),
        None => trimmed,
    };

    let wide: i128 = integral
        .parse()
        .with_context(|| format!("Checksum sum '{}' is not a valid integer", trimmed))?;
    Ok(wide as i64)
}

/// Query returning `(count, checksum_sum_text)` in one pass over the table
pub(crate) fn aggregate_query(qualified_table: &str) -> String {
    format!(
        "SELECT
            COUNT(*),
            (COALESCE(SUM(('x' || substr(md5({alias}::text), 1, 16))::bit(64)::bigint), 0)
                % 18446744073709551616)::text
         FROM {table} {alias}",
        alias = ROW_ALIAS,
        table = qualified_table
    )
}

/// Query returning one hex md5 digest per row
pub(crate) fn digest_stream_query(qualified_table: &str) -> String {
    format!(
        "SELECT md5({alias}::text) FROM {table} {alias}",
        alias = ROW_ALIAS,
        table = qualified_table
    )
}
