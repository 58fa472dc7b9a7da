#![allow(dead_code)]

use rust_xlsxwriter::ExcelDateTime;
use rust_xlsxwriter::Format;
use rust_xlsxwriter::Workbook;
use rusty_ask::Config;
use rusty_ask::Engine;
use rusty_ask::GenerationError;
use rusty_ask::Prompt;
use rusty_ask::TextGenerator;
use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

/// Answers SQL prompts with queued queries and summary prompts by echoing
/// the result rows it was shown.
pub struct ScriptedModel {
    queries: Mutex<VecDeque<String>>,
    repeat_last: bool,
    sql_prompts: Mutex<Vec<Prompt>>,
    summary_prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedModel {
    pub fn new(queries: &[&str]) -> Arc<Self> {
        Self::build(queries, false)
    }

    /// Keeps answering with the last query once the others are used up.
    pub fn repeating(query: &str) -> Arc<Self> {
        Self::build(&[query], true)
    }

    fn build(queries: &[&str], repeat_last: bool) -> Arc<Self> {
        Arc::new(ScriptedModel {
            queries: Mutex::new(queries.iter().map(|query| query.to_string()).collect()),
            repeat_last,
            sql_prompts: Mutex::new(Vec::new()),
            summary_prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn sql_prompts(&self) -> Vec<Prompt> {
        self.sql_prompts.lock().unwrap().clone()
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_prompts.lock().unwrap().len()
    }
}

impl TextGenerator for ScriptedModel {
    fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        if prompt.user.starts_with("QUESTION:") {
            self.summary_prompts.lock().unwrap().push(prompt.clone());
            let rows: Vec<&str> = prompt.user.lines().filter(|line| line.starts_with("| ")).skip(1).collect();
            return Ok(format!("Based on the data:\n{}", rows.join("\n")));
        }
        self.sql_prompts.lock().unwrap().push(prompt.clone());
        let mut queries = self.queries.lock().unwrap();
        let query = if self.repeat_last && queries.len() == 1 {
            queries.front().cloned()
        } else {
            queries.pop_front()
        };
        query.ok_or(GenerationError::EmptyResponse)
    }
}

/// Takes longer than any test is willing to wait.
pub struct SlowModel(pub Duration);

impl TextGenerator for SlowModel {
    fn generate(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
        std::thread::sleep(self.0);
        Ok("SELECT 1".to_owned())
    }
}

pub fn engine(model: Arc<dyn TextGenerator>) -> Engine {
    Engine::new(Config::default(), model).unwrap()
}

/// Writes `sales.xlsx` with sheets `Q1` and `Q2` of region, units and sale date.
///
/// Units per region are East 15, West 7 and North 3 in Q1, East 4 and South 9 in Q2.
pub fn write_sales_workbook(dir: &Path) -> PathBuf {
    let path = dir.join("sales.xlsx");
    let date = Format::new().set_num_format("yyyy-mm-dd");
    let mut workbook = Workbook::new();
    let quarters: [(&str, &[(&str, f64, u8)]); 2] = [
        ("Q1", &[("East", 10.0, 1), ("West", 7.0, 2), ("East", 5.0, 2), ("North", 3.0, 3)]),
        ("Q2", &[("East", 4.0, 4), ("South", 9.0, 5)]),
    ];
    for (name, rows) in quarters {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name).unwrap();
        worksheet.write_string(0, 0, "Region").unwrap();
        worksheet.write_string(0, 1, "Units").unwrap();
        worksheet.write_string(0, 2, "Sold On").unwrap();
        for (index, (region, units, month)) in rows.iter().enumerate() {
            let row = index as u32 + 1;
            let sold_on = ExcelDateTime::from_ymd(2024, *month, 15).unwrap();
            worksheet.write_string(row, 0, *region).unwrap();
            worksheet.write_number(row, 1, *units).unwrap();
            worksheet.write_datetime_with_format(row, 2, &sold_on, &date).unwrap();
        }
    }
    workbook.save(&path).unwrap();
    path
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
