//! Branch naming policy: the scratch prefix, validation, and session name
//! generation.

use rand::seq::SliceRandom;
use rand::Rng;

/// Prefix of machine-generated scratch branches.
pub const SCRATCH_PREFIX: &str = "catnip/";

/// Maximum branch name length accepted from suggestions.
pub const MAX_BRANCH_NAME_LEN: usize = 100;

const ADJECTIVES: &[&str] = &[
    "agile", "bold", "bright", "calm", "clever", "cosmic", "curious", "daring", "eager", "fuzzy",
    "gentle", "happy", "keen", "lively", "lucky", "mellow", "nimble", "plucky", "quiet", "rapid",
    "sleek", "sunny", "swift", "witty",
];

const ANIMALS: &[&str] = &[
    "badger", "bobcat", "cougar", "coyote", "falcon", "ferret", "gecko", "heron", "ibex", "jaguar",
    "lemur", "lynx", "marmot", "marten", "ocelot", "otter", "panda", "puffin", "quokka", "raven",
    "stoat", "tapir", "walrus", "wombat",
];

/// Whether a branch name is a machine-generated scratch branch.
///
/// Accepts full refs: a leading `refs/heads/` is stripped before matching.
pub fn is_scratch_branch(branch: &str) -> bool {
    let branch = branch.strip_prefix("refs/heads/").unwrap_or(branch);
    branch.starts_with(SCRATCH_PREFIX) && branch.len() > SCRATCH_PREFIX.len()
}

/// Strip the markers `git branch` listings carry: `*`/`+` prefixes,
/// surrounding whitespace, and a `remotes/origin/` prefix.
pub fn clean_branch_listing_name(line: &str) -> String {
    let name = line.trim();
    let name = name.strip_prefix('*').unwrap_or(name);
    let name = name.strip_prefix('+').unwrap_or(name);
    let name = name.trim();
    let name = name.strip_prefix("remotes/origin/").unwrap_or(name);
    name.to_string()
}

/// Validate a suggested branch name against the subset of git ref rules the
/// supervisor enforces before attempting a rename.
///
/// This is a syntactic pre-check; the graduation worker additionally runs
/// `git check-ref-format refs/heads/<name>`.
pub fn validate_branch_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_BRANCH_NAME_LEN {
        return false;
    }

    const FORBIDDEN: &[&str] = &["..", "~", "^", ":", "?", "*", "[", "\\", " "];
    if FORBIDDEN.iter().any(|pattern| name.contains(pattern)) {
        return false;
    }

    if name.starts_with('/') || name.ends_with('/') || name.starts_with('.') || name.ends_with('.')
    {
        return false;
    }

    true
}

/// Generate a scratch session name (`catnip/<adjective>-<animal>`) that the
/// `taken` predicate does not report as in use. Falls back to a numeric
/// suffix when the word lists are exhausted by collisions.
pub fn generate_session_name(taken: impl Fn(&str) -> bool) -> String {
    let mut rng = rand::thread_rng();

    for _ in 0..32 {
        let adjective = ADJECTIVES.choose(&mut rng).unwrap_or(&"lively");
        let animal = ANIMALS.choose(&mut rng).unwrap_or(&"otter");
        let candidate = format!("{SCRATCH_PREFIX}{adjective}-{animal}");
        if !taken(&candidate) {
            return candidate;
        }
    }

    loop {
        let n: u32 = rng.gen_range(2..10_000);
        let candidate = format!("{SCRATCH_PREFIX}session-{n}");
        if !taken(&candidate) {
            return candidate;
        }
    }
}
