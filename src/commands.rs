/// Available commands and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "open",
    aliases: &["o", "fetch", "get"],
    description: "Fetch a URL into the cache",
  },
  Command {
    name: "revalidate",
    aliases: &["r", "refresh"],
    description: "Refetch the selected entry",
  },
  Command {
    name: "delete",
    aliases: &["d", "rm", "evict"],
    description: "Remove the selected entry from memory",
  },
  Command {
    name: "suspend",
    aliases: &["snapshot", "save"],
    description: "Persist the in-memory cache now",
  },
  Command {
    name: "resume",
    aliases: &["rehydrate", "load"],
    description: "Merge the persisted snapshot into memory now",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Snapshot and exit",
  },
];

/// How well `cmd` matches `input`; lower is better.
fn rank(cmd: &Command, input: &str) -> Option<u32> {
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) || cmd.aliases.iter().any(|a| a.contains(input)) {
    Some(4)
  } else {
    None
  }
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.trim().to_lowercase();

  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&'static Command, u32)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd, &input).map(|r| (cmd, r)))
    .collect();

  // Stable sort keeps declaration order within a rank
  matches.sort_by_key(|(_, r)| *r);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    assert_eq!(get_suggestions("").len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    assert_eq!(get_suggestions("resume")[0].name, "resume");
  }

  #[test]
  fn test_alias_match() {
    assert_eq!(get_suggestions("save")[0].name, "suspend");
    assert_eq!(get_suggestions("q")[0].name, "quit");
  }

  #[test]
  fn test_prefix_beats_substring() {
    let suggestions = get_suggestions("re");
    let names: Vec<&str> = suggestions.iter().map(|c| c.name).collect();
    assert_eq!(&names[..2], &["revalidate", "resume"]);
  }

  #[test]
  fn test_no_match() {
    assert!(get_suggestions("zzz").is_empty());
  }
}
