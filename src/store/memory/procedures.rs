//! Version-control stored procedures.

use crate::store::error::{StoreError, StoreResult, ER_SP_DOES_NOT_EXIST, ER_UNKNOWN};
use crate::store::{ResultSet, Value};

use super::repo::{CommitOptions, Repo};

fn fail(message: impl Into<String>) -> StoreError {
    StoreError::rejected(ER_UNKNOWN, message)
}

fn status_ok() -> ResultSet {
    let mut rs = ResultSet::new(vec!["status".into()]);
    rs.push(vec![Value::from(0)]);
    rs
}

/// Run `CALL name(args...)` against `branch`.
pub(super) fn call(repo: &mut Repo, branch: &str, name: &str, args: &[Value]) -> StoreResult<ResultSet> {
    let args = args
        .iter()
        .map(|a| match a {
            Value::String(s) => Ok(s.clone()),
            Value::Null => Err(fail(format!("{name}: NULL argument"))),
            other => Ok(other.to_string()),
        })
        .collect::<StoreResult<Vec<_>>>()?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match name.to_ascii_uppercase().as_str() {
        "DOLT_BRANCH" => branch_proc(repo, branch, &args),
        "DOLT_ADD" => add(repo, branch, &args),
        "DOLT_COMMIT" => commit(repo, branch, &args),
        "DOLT_RESET" => reset(repo, branch, &args),
        "DOLT_MERGE" => merge(repo, branch, &args),
        _ => Err(StoreError::rejected(
            ER_SP_DOES_NOT_EXIST,
            format!("stored procedure \"{name}\" does not exist"),
        )),
    }
}

fn branch_proc(repo: &mut Repo, current: &str, args: &[&str]) -> StoreResult<ResultSet> {
    let mut delete = false;
    let mut force = false;
    let mut names = Vec::new();
    for arg in args {
        match *arg {
            "-d" | "--delete" => delete = true,
            "-D" => {
                delete = true;
                force = true;
            }
            "-f" | "--force" => force = true,
            flag if flag.starts_with('-') => return Err(fail(format!("unknown option `{flag}`"))),
            name => names.push(name),
        }
    }

    if delete {
        if names.is_empty() {
            return Err(fail("error: branch name must be specified"));
        }
        for name in names {
            repo.delete_branch(current, name, force)?;
        }
        return Ok(status_ok());
    }

    let (name, start) = match names.as_slice() {
        [name] => (*name, "HEAD"),
        [name, start] => (*name, *start),
        _ => return Err(fail("Invalid usage: expected branch name and optional start point")),
    };
    let start = repo.resolve(current, start)?;
    repo.create_branch(name, &start)?;
    Ok(status_ok())
}

fn add(repo: &mut Repo, branch: &str, args: &[&str]) -> StoreResult<ResultSet> {
    match args {
        [] => return Err(fail("Nothing specified, nothing added.")),
        _ if args.iter().any(|a| matches!(*a, "-A" | "--all" | ".")) => repo.stage_all(branch)?,
        tables => {
            let tables: Vec<String> = tables.iter().map(|t| t.to_string()).collect();
            repo.stage_tables(branch, &tables)?;
        }
    }
    Ok(status_ok())
}

/// Parse `Name <email>`.
fn parse_author(author: &str) -> StoreResult<(String, String)> {
    let invalid = || fail(format!("invalid author: {author}"));
    let (name, rest) = author.split_once('<').ok_or_else(invalid)?;
    let email = rest.strip_suffix('>').ok_or_else(invalid)?;
    let name = name.trim();
    if name.is_empty() || email.trim().is_empty() {
        return Err(invalid());
    }
    Ok((name.to_string(), email.trim().to_string()))
}

fn commit(repo: &mut Repo, branch: &str, args: &[&str]) -> StoreResult<ResultSet> {
    let mut options = CommitOptions::default();
    let mut stage = false;
    let mut message = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .map(|v| v.to_string())
                .ok_or_else(|| fail(format!("option `{flag}` requires a value")))
        };
        match *arg {
            "-A" | "-a" | "--all" | "--ALL" => stage = true,
            "--skip-empty" => options.skip_empty = true,
            "--allow-empty" => options.allow_empty = true,
            "--author" => options.author = Some(parse_author(&value(*arg)?)?),
            "-m" | "--message" => message = Some(value(*arg)?),
            "-am" | "-Am" => {
                stage = true;
                message = Some(value(*arg)?);
            }
            other => return Err(fail(format!("unknown option `{other}`"))),
        }
    }

    if options.skip_empty && options.allow_empty {
        return Err(fail("error: cannot use both --skip-empty and --allow-empty"));
    }
    options.message = message.ok_or_else(|| fail("Must provide commit message."))?;

    if stage {
        repo.stage_all(branch)?;
    }
    let hash = repo.commit_staged(branch, options)?;

    let mut rs = ResultSet::new(vec!["hash".into()]);
    rs.push(vec![hash.map_or(Value::Null, Value::from)]);
    Ok(rs)
}

fn reset(repo: &mut Repo, branch: &str, args: &[&str]) -> StoreResult<ResultSet> {
    match args {
        ["--hard"] => {
            let head = repo.resolve(branch, "HEAD")?;
            repo.reset_hard(branch, &head)?;
        }
        ["--hard", target] => {
            let target = repo.resolve(branch, target)?;
            repo.reset_hard(branch, &target)?;
        }
        [] | ["--soft"] => repo.reset_soft(branch)?,
        tables if tables.iter().all(|t| !t.starts_with('-')) => {
            let head = repo.head_commit(branch)?.root.clone();
            let state = repo.branch_mut(branch)?;
            for table in tables {
                match head.get(*table) {
                    Some(committed) => {
                        state.staged.insert(table.to_string(), committed.clone());
                    }
                    None => {
                        state.staged.remove(*table);
                    }
                }
            }
        }
        _ => return Err(fail(format!("invalid arguments to DOLT_RESET: {args:?}"))),
    }
    Ok(status_ok())
}

fn merge(repo: &mut Repo, branch: &str, args: &[&str]) -> StoreResult<ResultSet> {
    let source = match args {
        [source] if !source.starts_with('-') => *source,
        _ => return Err(fail("error: expected a single branch or commit to merge")),
    };
    let outcome = repo.merge(branch, source)?;

    let mut rs = ResultSet::new(vec![
        "hash".into(),
        "fast_forward".into(),
        "conflicts".into(),
        "message".into(),
    ]);
    rs.push(vec![
        outcome.hash.map_or(Value::Null, Value::from),
        Value::from(u64::from(outcome.fast_forward)),
        Value::from(outcome.conflicts),
        Value::from(outcome.message),
    ]);
    Ok(rs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| json!(v)).collect()
    }

    #[test]
    fn test_parse_author() {
        assert_eq!(
            parse_author("Jane Doe <jane@example.com>").unwrap(),
            ("Jane Doe".to_string(), "jane@example.com".to_string())
        );
        assert!(parse_author("jane@example.com").is_err());
        assert!(parse_author("<jane@example.com>").is_err());
    }

    #[test]
    fn test_commit_requires_message() {
        let mut repo = Repo::init("main");
        let err = call(&mut repo, "main", "DOLT_COMMIT", &args(&["--allow-empty"])).unwrap_err();
        assert!(err.to_string().contains("commit message"));
    }

    #[test]
    fn test_skip_empty_commit_returns_null_hash() {
        let mut repo = Repo::init("main");
        let rs = call(&mut repo, "main", "dolt_commit", &args(&["-A", "--skip-empty", "-m", "noop"])).unwrap();
        assert_eq!(rs.columns, vec!["hash"]);
        assert_eq!(rs.rows, vec![vec![Value::Null]]);
    }

    #[test]
    fn test_branch_create_and_force_delete() {
        let mut repo = Repo::init("main");
        call(&mut repo, "main", "DOLT_BRANCH", &args(&["feature"])).unwrap();
        assert!(repo.has_branch("feature"));
        assert!(call(&mut repo, "main", "DOLT_BRANCH", &args(&["feature"])).is_err());

        call(&mut repo, "main", "DOLT_BRANCH", &args(&["-D", "feature"])).unwrap();
        assert!(!repo.has_branch("feature"));
    }

    #[test]
    fn test_merge_self_is_up_to_date() {
        let mut repo = Repo::init("main");
        let rs = call(&mut repo, "main", "DOLT_MERGE", &args(&["main"])).unwrap();
        let row = rs.first().unwrap();
        assert_eq!(row.named("hash"), Some(&Value::Null));
        assert_eq!(row.named("conflicts"), Some(&json!(0)));
    }

    #[test]
    fn test_unknown_procedure() {
        let mut repo = Repo::init("main");
        let err = call(&mut repo, "main", "DOLT_PUSH", &[]).unwrap_err();
        assert!(matches!(err, StoreError::Rejected { code: Some(ER_SP_DOES_NOT_EXIST), .. }));
    }
}
