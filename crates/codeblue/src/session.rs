//! Interactive question loop

use std::io::{BufRead, Write};

use colored::*;

use crate::dataset::analyzer::DataAnalyzer;
use crate::dataset::chart::ChartKind;
use crate::error::Result;
use crate::qa::HealthcareAnalyst;

const QUESTION_PROMPT: &str =
  "Team CodeBlue Enter your question about the healthcare data (or 'quit' to exit): ";

pub struct Session<'a> {
  analyst: &'a HealthcareAnalyst,
  analyzer: &'a DataAnalyzer,
}

impl<'a> Session<'a> {
  pub fn new(analyst: &'a HealthcareAnalyst, analyzer: &'a DataAnalyzer) -> Self {
    Self { analyst, analyzer }
  }

  /// Run until the user types `quit` or input ends. Bad questions and chart
  /// requests are reported inline and the loop carries on.
  pub async fn run<R: BufRead, W: Write>(&self, input: &mut R, output: &mut W) -> Result<usize> {
    writeln!(output, "\n{}", "=== CodeBlue Healthcare Data Analysis System ===".blue().bold())?;
    writeln!(output, "Type your questions about the healthcare data or 'quit' to exit")?;
    writeln!(output, "{}\n", "================================================".blue().bold())?;

    let mut answered = 0;
    loop {
      let Some(question) = ask(input, output, &format!("\n{QUESTION_PROMPT}"))? else {
        break;
      };
      if question.eq_ignore_ascii_case("quit") {
        break;
      }

      let answer = self.analyst.answer(&question).await;
      answered += 1;
      writeln!(output, "\n{} {answer}", "AI Analysis:".green().bold())?;

      let Some(wants_chart) =
        ask(input, output, "\nWould you like to see any visualizations? (yes/no): ")?
      else {
        break;
      };
      if wants_chart.eq_ignore_ascii_case("yes") {
        self.chart(input, output)?;
      }
    }

    Ok(answered)
  }

  fn chart<R: BufRead, W: Write>(&self, input: &mut R, output: &mut W) -> Result<()> {
    let Some(column) = ask(input, output, "Which column would you like to visualize?: ")? else {
      return Ok(());
    };
    let Some(kind) = ask(input, output, "What type of chart? (histogram/box): ")? else {
      return Ok(());
    };

    let rendered = kind
      .parse::<ChartKind>()
      .and_then(|kind| self.analyzer.generate_visualization(&column, kind));

    match rendered {
      Ok(chart) => write!(output, "\n{chart}")?,
      Err(e) => writeln!(output, "{} {e}", "Could not render chart:".red())?,
    }
    Ok(())
  }
}

/// Prompt and read one trimmed line; `None` at end of input
fn ask<R: BufRead, W: Write>(
  input: &mut R,
  output: &mut W,
  prompt: &str,
) -> Result<Option<String>> {
  write!(output, "{prompt}")?;
  output.flush()?;

  let mut line = String::new();
  if input.read_line(&mut line)? == 0 {
    return Ok(None);
  }
  Ok(Some(line.trim().to_string()))
}
