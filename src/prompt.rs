use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

fn read_line(question: &str) -> Result<String> {
    print!("{question}");
    io::stdout().flush().context("failed to flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim().to_string())
}

/// Read one raw line behind a prompt, trimmed.
pub fn ask_line(label: &str) -> Result<String> {
    read_line(label)
}

/// Ask for a string; an empty answer keeps the default.
pub fn ask_string(label: &str, default: &str) -> Result<String> {
    let answer = read_line(&format!("{label} [{default}]: "))?;
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer
    })
}

/// Ask for a number, re-asking until the answer parses.
pub fn ask_f64(label: &str, default: f64) -> Result<f64> {
    loop {
        let answer = read_line(&format!("{label} [{default}]: "))?;
        if answer.is_empty() {
            return Ok(default);
        }
        match answer.parse() {
            Ok(value) => return Ok(value),
            Err(_) => println!("Please enter a number."),
        }
    }
}

pub fn ask_u32(label: &str, default: u32) -> Result<u32> {
    loop {
        let answer = read_line(&format!("{label} [{default}]: "))?;
        if answer.is_empty() {
            return Ok(default);
        }
        match answer.parse() {
            Ok(value) => return Ok(value),
            Err(_) => println!("Please enter a whole number."),
        }
    }
}

pub fn ask_yes_no(label: &str, default: bool) -> Result<bool> {
    let hint = if default { "Y/n" } else { "y/N" };
    loop {
        let answer = read_line(&format!("{label} ({hint}): "))?.to_lowercase();
        match answer.as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => println!("Please answer y or n."),
        }
    }
}

/// Block until the operator presses enter.
pub fn wait_enter(message: &str) -> Result<()> {
    read_line(message).map(|_| ())
}
