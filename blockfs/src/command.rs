//! Text command surface: one command per line, whitespace separated tokens.
//!
//! | Command  | Args                 | Effect                                     |
//! |----------|----------------------|--------------------------------------------|
//! | `mkdir`  | name                 | create a directory                         |
//! | `touch`  | name                 | create an empty file                       |
//! | `ls`     |                      | list the current directory                 |
//! | `cd`     | name, `..`, `.`      | change the current directory               |
//! | `move`   | src, target dir      | move src under a directory of the cwd      |
//! | `write`  | name, data...        | replace file content                       |
//! | `read`   | name                 | print file content                         |
//! | `delete` | name                 | remove a file or directory tree            |
//! | `inodes` |                      | dump the inode table (indexed volumes)     |
//! | `blocks` |                      | free block count and numbers               |
//! | `pwd`    |                      | print the current directory                |
//! | `stat`   | name                 | kind, size and blocks of a node            |
//! | `df`     |                      | geometry and usage                         |
//! | `help`   |                      | list commands                              |
//! | `exit`   |                      | end the session                            |

use std::io::{BufRead, Write};
use std::str::FromStr;

use log::debug;

use crate::fs::{FileSystem, FsError, Result};

const COMMANDS: &[(&str, &str, &str)] = &[
    ("mkdir", "<name>", "create a directory"),
    ("touch", "<name>", "create an empty file"),
    ("ls", "", "list the current directory"),
    ("cd", "<dir|..|.>", "change the current directory"),
    ("move", "<src> <target-dir>", "move src into a directory of the current one"),
    ("write", "<name> <data...>", "replace the content of a file"),
    ("read", "<name>", "print the content of a file"),
    ("delete", "<name>", "remove a file or a directory tree"),
    ("inodes", "", "dump the inode table"),
    ("blocks", "", "show free blocks"),
    ("pwd", "", "print the current directory"),
    ("stat", "<name>", "show kind, size and blocks"),
    ("df", "", "show volume geometry and usage"),
    ("help", "", "list commands"),
    ("exit", "", "end the session"),
];

const INODES_HEADER: &str = " ino  kind      size  path                      blocks";

fn usage(op: &str) -> String {
    COMMANDS
        .iter()
        .find(|(name, _, _)| *name == op)
        .map(|(name, args, _)| format!("usage: {} {}", name, args))
        .unwrap_or_else(|| format!("usage: {}", op))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Mkdir(String),
    Touch(String),
    Ls,
    Cd(String),
    Move { source: String, target: String },
    Write { path: String, data: String },
    Read(String),
    Delete(String),
    Inodes,
    Blocks,
    Pwd,
    Stat(String),
    Df,
    Help,
    Exit,
}

impl FromStr for Command {
    type Err = FsError;

    /// Extra arguments are ignored. The data of `write` is every token after
    /// the file name joined by single spaces.
    fn from_str(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let op = tokens
            .next()
            .ok_or_else(|| FsError::InvalidArgument("empty command".to_string()))?;
        let args: Vec<&str> = tokens.collect();
        let arg = |n: usize| {
            args.get(n)
                .map(|s| s.to_string())
                .ok_or_else(|| FsError::InvalidArgument(usage(op)))
        };

        let cmd = match op {
            "mkdir" => Command::Mkdir(arg(0)?),
            "touch" => Command::Touch(arg(0)?),
            "ls" => Command::Ls,
            "cd" => Command::Cd(arg(0)?),
            "move" => Command::Move {
                source: arg(0)?,
                target: arg(1)?,
            },
            "write" => Command::Write {
                path: arg(0)?,
                data: args[1..].join(" "),
            },
            "read" => Command::Read(arg(0)?),
            "delete" => Command::Delete(arg(0)?),
            "inodes" => Command::Inodes,
            "blocks" => Command::Blocks,
            "pwd" => Command::Pwd,
            "stat" => Command::Stat(arg(0)?),
            "df" => Command::Df,
            "help" => Command::Help,
            "exit" => Command::Exit,
            other => return Err(FsError::UnknownCommand(other.to_string())),
        };
        Ok(cmd)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Text to show the user, possibly empty.
    Output(String),
    Exit,
}

impl Command {
    pub fn execute(&self, fs: &mut dyn FileSystem) -> Result<Outcome> {
        let text = match self {
            Command::Mkdir(name) => fs.mkdir(name).map(|_| String::new())?,
            Command::Touch(name) => fs.touch(name).map(|_| String::new())?,
            Command::Ls => fs
                .ls()
                .iter()
                .map(|entry| entry.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
            Command::Cd(path) => fs.cd(path).map(|_| String::new())?,
            Command::Move { source, target } => {
                fs.move_node(source, target)?;
                format!("moved {} to {}", source, target)
            }
            Command::Write { path, data } => {
                fs.write(path, data.as_bytes())?;
                String::new()
            }
            Command::Read(path) => String::from_utf8_lossy(&fs.read(path)?).into_owned(),
            Command::Delete(path) => {
                fs.delete(path)?;
                format!("removed {}", path)
            }
            Command::Inodes => {
                let mut out = String::from(INODES_HEADER);
                for record in fs.inodes()? {
                    out.push('\n');
                    out.push_str(&record.to_string());
                }
                out
            }
            Command::Blocks => {
                let free = fs.free_blocks();
                format!("{} free blocks: {:?}", free.len(), free)
            }
            Command::Pwd => fs.pwd(),
            Command::Stat(path) => {
                let meta = fs.stat(path)?;
                let mut out = format!(
                    "path:   {}\nkind:   {}\nsize:   {} bytes\nblocks: {:?}",
                    meta.path, meta.file_type, meta.size, meta.blocks
                );
                if let Some(ino) = meta.ino {
                    out.push_str(&format!("\ninode:  {}", ino));
                }
                out
            }
            Command::Df => format!("backend:      {}\n{}", fs.backend(), fs.statfs()),
            Command::Help => COMMANDS
                .iter()
                .map(|(name, args, help)| format!("{:<7} {:<20} {}", name, args, help))
                .collect::<Vec<_>>()
                .join("\n"),
            Command::Exit => return Ok(Outcome::Exit),
        };
        Ok(Outcome::Output(text))
    }
}

/// Runs commands read line by line from `input` until `exit` or end of input.
///
/// Command errors are reported on `out` and the session carries on; only I/O
/// errors on `input` or `out` end it early. With `prompt` set, `>> {cwd}: ` is
/// written before every line.
pub fn run_session<R: BufRead, W: Write>(
    fs: &mut dyn FileSystem,
    mut input: R,
    mut out: W,
    prompt: bool,
) -> std::io::Result<()> {
    let mut line = String::new();
    loop {
        if prompt {
            write!(out, ">> {}: ", fs.pwd())?;
            out.flush()?;
        }
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.parse::<Command>().and_then(|cmd| cmd.execute(fs)) {
            Ok(Outcome::Exit) => break,
            Ok(Outcome::Output(text)) => {
                if !text.is_empty() {
                    writeln!(out, "{}", text)?;
                }
            }
            Err(e) => {
                debug!("command {:?} failed: {}", line, e);
                writeln!(out, "error: {}", e)?;
            }
        }
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sb::SuperBlock;
    use crate::{ChainedFs, IndexedFs};

    fn session(fs: &mut dyn FileSystem, script: &str) -> String {
        let mut out = Vec::new();
        run_session(fs, script.as_bytes(), &mut out, false).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parses_commands_and_arguments() {
        assert_eq!("ls".parse::<Command>().unwrap(), Command::Ls);
        assert_eq!(
            "move a/b  dir".parse::<Command>().unwrap(),
            Command::Move {
                source: "a/b".into(),
                target: "dir".into()
            }
        );
        assert_eq!(
            "write f hello   big world".parse::<Command>().unwrap(),
            Command::Write {
                path: "f".into(),
                data: "hello big world".into()
            }
        );
        assert_eq!(
            "write f".parse::<Command>().unwrap(),
            Command::Write {
                path: "f".into(),
                data: String::new()
            }
        );
    }

    #[test]
    fn unknown_commands_and_missing_arguments_are_errors() {
        assert!(matches!(
            "format c:".parse::<Command>(),
            Err(FsError::UnknownCommand(op)) if op == "format"
        ));
        match "move a".parse::<Command>() {
            Err(FsError::InvalidArgument(msg)) => {
                assert_eq!(msg, "usage: move <src> <target-dir>")
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!("   ".parse::<Command>().is_err());
    }

    #[test]
    fn session_runs_until_exit() {
        let mut fs = IndexedFs::create(&SuperBlock::new(16, 4)).unwrap();
        let out = session(
            &mut fs,
            "mkdir docs\ntouch a.txt\nwrite a.txt hello there\nread a.txt\nls\nexit\nls\n",
        );
        assert_eq!(out, "hello there\ndocs/\na.txt\n");
    }

    #[test]
    fn session_reports_errors_and_keeps_going() {
        let mut fs = ChainedFs::create(&SuperBlock::new(16, 4)).unwrap();
        let out = session(&mut fs, "bogus\ncd nowhere\n\ntouch f\npwd\n");
        assert_eq!(
            out,
            "error: unknown command: bogus\nerror: nowhere: no such file or directory\n/\n"
        );
    }

    #[test]
    fn prompt_shows_current_directory() {
        let mut fs = ChainedFs::create(&SuperBlock::new(16, 4)).unwrap();
        let mut out = Vec::new();
        run_session(&mut fs, "mkdir d\ncd d\n".as_bytes(), &mut out, true).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), ">> /: >> /: >> /d: ");
    }

    #[test]
    fn inodes_is_unsupported_on_chained_volumes() {
        let mut fs = ChainedFs::create(&SuperBlock::new(4, 4)).unwrap();
        let err = Command::Inodes.execute(&mut fs).unwrap_err();
        assert!(matches!(err, FsError::Unsupported { op: "inodes", .. }));
    }

    #[test]
    fn inodes_lists_every_node_of_indexed_volumes() {
        let mut fs = IndexedFs::create(&SuperBlock::new(8, 4)).unwrap();
        session(&mut fs, "mkdir d\ntouch d/f\nwrite d/f abcdef\n");

        let out = match Command::Inodes.execute(&mut fs).unwrap() {
            Outcome::Output(text) => text,
            Outcome::Exit => panic!("unexpected exit"),
        };
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains(" /"));
        assert!(lines[3].contains("/d/f"));
        assert!(lines[3].ends_with("[0, 1]"));
    }

    #[test]
    fn blocks_reports_free_list() {
        let mut fs = IndexedFs::create(&SuperBlock::new(3, 4)).unwrap();
        let out = session(&mut fs, "touch f\nwrite f abcde\nblocks\n");
        assert_eq!(out, "1 free blocks: [2]\n");
    }
}
