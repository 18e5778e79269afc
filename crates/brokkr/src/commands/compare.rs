//! `brokkr compare` - compare two version strings

use std::cmp::Ordering;

use anyhow::Result;

use brokkr_core::Version;

use crate::cli::CompareArgs;

pub fn run(args: CompareArgs) -> Result<()> {
    let left: Version = args.left.parse()?;
    let right: Version = args.right.parse()?;

    let verdict = match left.cmp(&right) {
        Ordering::Less => format!("{left} is lower than {right}"),
        Ordering::Greater => format!("{left} is higher than {right}"),
        Ordering::Equal => format!("{left} is the same as {right}"),
    };
    println!("{verdict}");
    Ok(())
}
