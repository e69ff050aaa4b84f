use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::MAX_NAME_LEN;
use crate::parser::{self, Command, MAX_HISTORY_ENTRY_LEN};
use crate::{report, storage, RecordError, RecordStore, StoreConfig};

/// Files the session reads and writes.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub data_file: PathBuf,
    pub report_file: PathBuf,
    pub json_file: PathBuf,
}

impl Default for SessionPaths {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("patients.dat"),
            report_file: PathBuf::from("patients.txt"),
            json_file: PathBuf::from("patients.json"),
        }
    }
}

/// Store the session starts with, plus what the operator should be told.
#[derive(Debug)]
pub struct OpenedStore {
    pub store: RecordStore,
    pub notice: String,
    /// The data file exists but was not loaded; saving must be confirmed.
    pub protect_data_file: bool,
}

/// Loads the startup store. Only an allocation failure is returned as an
/// error; unreadable or damaged files fall back to what could be recovered.
pub fn open_store(path: &Path, config: StoreConfig, strict: bool) -> crate::Result<OpenedStore> {
    let loaded = if strict {
        storage::load(path, config).map(|store| (store, None))
    } else {
        storage::load_lenient(path, config).map(|report| (report.store, report.error))
    };

    match loaded {
        Ok((store, None)) => Ok(OpenedStore {
            notice: format!("Loaded {} patient(s).", store.len()),
            store,
            protect_data_file: false,
        }),
        Ok((store, Some(e))) => Ok(OpenedStore {
            notice: format!(
                "[\u{26a0}\u{fe0f}] {} is damaged: {}\n    Kept the first {} readable patient(s); saving will replace the file.",
                path.display(),
                e,
                store.len()
            ),
            store,
            protect_data_file: false,
        }),
        Err(e @ RecordError::Allocation(_)) => Err(e),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "startup load failed");
            Ok(OpenedStore {
                store: RecordStore::with_config(config)?,
                notice: format!(
                    "[\u{26a0}\u{fe0f}] Could not load {}: {}\n    Starting with an empty store; the file is kept until you confirm overwriting it.",
                    path.display(),
                    e
                ),
                protect_data_file: true,
            })
        }
    }
}

/// Why a prompt gave up.
enum Prompt {
    Eof,
    Io(io::Error),
}

impl From<io::Error> for Prompt {
    fn from(e: io::Error) -> Self {
        Prompt::Io(e)
    }
}

/// Menu loop over any line source. Every failed command is reported and
/// control returns to the menu.
pub struct Session<R, W> {
    store: RecordStore,
    paths: SessionPaths,
    save_on_exit: bool,
    protect_data_file: bool,
    dirty: bool,
    input: R,
    out: W,
}

impl<R: BufRead, W: Write> Session<R, W> {
    pub fn new(store: RecordStore, paths: SessionPaths, input: R, out: W) -> Self {
        Self { store, paths, save_on_exit: false, protect_data_file: false, dirty: false, input, out }
    }

    /// Ask before the first save replaces the data file.
    pub fn protect_data_file(mut self, yes: bool) -> Self {
        self.protect_data_file = yes;
        self
    }

    /// Save without asking when the session ends.
    pub fn save_on_exit(mut self, yes: bool) -> Self {
        self.save_on_exit = yes;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn into_store(self) -> RecordStore {
        self.store
    }

    pub fn run(&mut self) -> io::Result<()> {
        self.print_menu()?;
        loop {
            let line = match self.prompt("> ") {
                Ok(line) => line,
                Err(Prompt::Eof) => return self.finish(false),
                Err(Prompt::Io(e)) => return Err(e),
            };
            if line.trim().is_empty() {
                continue;
            }

            let cmd = match parser::parse_command(&line) {
                Ok(cmd) => cmd,
                Err(e) => {
                    writeln!(self.out, "[\u{2717}] {} (type 'help' for the menu)", e)?;
                    continue;
                }
            };

            if cmd == Command::Exit {
                return self.finish(true);
            }

            match self.execute(cmd) {
                Ok(()) => {}
                Err(Prompt::Eof) => return self.finish(false),
                Err(Prompt::Io(e)) => return Err(e),
            }
        }
    }

    fn execute(&mut self, cmd: Command) -> Result<(), Prompt> {
        match cmd {
            Command::Help => self.print_menu()?,
            Command::Add => self.add()?,
            Command::UpdateHistory => self.update_history()?,
            Command::Discharge => self.discharge()?,
            Command::Find => self.find()?,
            Command::ListActive => self.list(false)?,
            Command::ListAll => self.list(true)?,
            Command::Remove => self.remove()?,
            Command::PurgeDischarged => self.purge()?,
            Command::Save => self.save()?,
            Command::ExportText => self.export_text()?,
            Command::ExportJson => self.export_json()?,
            Command::Exit => {}
        }
        Ok(())
    }

    fn print_menu(&mut self) -> io::Result<()> {
        writeln!(self.out, "\n=== Patient Records System ===")?;
        for (n, _, label) in Command::MENU.iter() {
            if *n == 1 {
                writeln!(self.out, "{:>2}. {} (max {})", n, label, self.store.max_capacity())?;
            } else {
                writeln!(self.out, "{:>2}. {}", n, label)?;
            }
        }
        Ok(())
    }

    fn prompt(&mut self, label: &str) -> Result<String, Prompt> {
        write!(self.out, "{}", label)?;
        self.out.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(Prompt::Eof);
        }
        Ok(line)
    }

    /// Re-asks until `parse` accepts the answer.
    fn ask<T>(&mut self, label: &str, parse: impl Fn(&str) -> Result<T, String>) -> Result<T, Prompt> {
        loop {
            let line = self.prompt(label)?;
            match parse(&line) {
                Ok(v) => return Ok(v),
                Err(e) => writeln!(self.out, "[\u{2717}] {}", e)?,
            }
        }
    }

    fn report(&mut self, op: &str, result: crate::Result<String>) -> io::Result<()> {
        match result {
            Ok(msg) => writeln!(self.out, "[\u{2713}] {}", msg),
            Err(e) => writeln!(self.out, "[\u{2717}] {} failed: {}", op, e),
        }
    }

    fn add(&mut self) -> Result<(), Prompt> {
        if self.store.len() >= self.store.max_capacity() {
            let max = self.store.max_capacity();
            writeln!(self.out, "[\u{2717}] Store full! Cannot add more than {} patients.", max)?;
            return Ok(());
        }

        let id = self.ask("Patient ID: ", parser::parse_int)?;
        let name = self.ask("Name: ", |s| parser::parse_text(s, MAX_NAME_LEN))?;
        let age = self.ask("Age: ", parser::parse_int)?;
        let gender = self.ask("Gender (M/F/O): ", parser::parse_gender)?;
        let history = self.ask("Medical history: ", |s| parser::parse_text(s, MAX_HISTORY_ENTRY_LEN))?;

        let result = self
        .store
        .add(id, &name, age, gender, &history)
        .map(|r| format!("Admitted {} (ID {})", r.name, r.id));
        self.dirty |= result.is_ok();
        self.report("add", result)?;
        Ok(())
    }

    fn update_history(&mut self) -> Result<(), Prompt> {
        let id = self.ask("Patient ID: ", parser::parse_int)?;
        let entry = self.ask("New history entry: ", |s| parser::parse_text(s, MAX_HISTORY_ENTRY_LEN))?;

        let result = self
        .store
        .update_history(id, &entry)
        .map(|_| format!("History updated for ID {}", id));
        self.dirty |= result.is_ok();
        self.report("update history", result)?;
        Ok(())
    }

    fn discharge(&mut self) -> Result<(), Prompt> {
        let id = self.ask("Patient ID: ", parser::parse_int)?;
        let result = self.store.discharge(id).map(|_| format!("Discharged ID {}", id));
        self.dirty |= result.is_ok();
        self.report("discharge", result)?;
        Ok(())
    }

    fn find(&mut self) -> Result<(), Prompt> {
        let id = self.ask("Patient ID: ", parser::parse_int)?;
        match self.store.find(id, true) {
            Some(record) => {
                writeln!(self.out)?;
                report::write_record(&mut self.out, record)?;
            }
            None => writeln!(self.out, "[\u{2717}] find failed: no patient found with id {}", id)?,
        }
        Ok(())
    }

    fn list(&mut self, include_discharged: bool) -> Result<(), Prompt> {
        let shown = report::write_text(&self.store, &mut self.out, include_discharged)?;
        if shown == 0 {
            writeln!(self.out, "(no patients)")?;
        }
        Ok(())
    }

    fn remove(&mut self) -> Result<(), Prompt> {
        let id = self.ask("Patient ID: ", parser::parse_int)?;
        let result = self.store.remove(id).map(|r| format!("Removed {} (ID {})", r.name, r.id));
        self.dirty |= result.is_ok();
        self.report("remove", result)?;
        Ok(())
    }

    fn purge(&mut self) -> Result<(), Prompt> {
        let removed = self.store.remove_discharged();
        self.dirty |= removed > 0;
        writeln!(self.out, "[\u{2713}] Purged {} discharged patient(s)", removed)?;
        Ok(())
    }

    /// Operator consent to replace a data file that was never loaded.
    fn confirm_overwrite(&mut self) -> Result<bool, Prompt> {
        if !self.protect_data_file {
            return Ok(true);
        }
        let label = format!(
            "{} was not loaded. Overwrite it? [y/N] ",
            self.paths.data_file.display()
        );
        let yes = self.ask(&label, |s| parser::parse_yes_no(s, false))?;
        if yes {
            self.protect_data_file = false;
        } else {
            writeln!(self.out, "[\u{2717}] save skipped: {} left untouched", self.paths.data_file.display())?;
        }
        Ok(yes)
    }

    fn save(&mut self) -> Result<(), Prompt> {
        if !self.confirm_overwrite()? {
            return Ok(());
        }
        let result = storage::save(&self.store, &self.paths.data_file)
        .map(|_| format!("Saved {} patient(s) to {}", self.store.len(), self.paths.data_file.display()));
        if result.is_ok() {
            self.dirty = false;
        }
        self.report("save", result)?;
        Ok(())
    }

    fn export_text(&mut self) -> Result<(), Prompt> {
        let result = report::export_text(&self.store, &self.paths.report_file)
        .map(|n| format!("Wrote {} patient(s) to {}", n, self.paths.report_file.display()));
        self.report("export", result)?;
        Ok(())
    }

    fn export_json(&mut self) -> Result<(), Prompt> {
        let result = report::export_json(&self.store, &self.paths.json_file)
        .map(|n| format!("Wrote {} patient(s) to {}", n, self.paths.json_file.display()));
        self.report("json export", result)?;
        Ok(())
    }

    fn finish(&mut self, interactive: bool) -> io::Result<()> {
        let wants_save = if self.save_on_exit {
            self.dirty
        } else if interactive && self.dirty {
            match self.ask("Save changes before exiting? [Y/n] ", |s| parser::parse_yes_no(s, true)) {
                Ok(yes) => yes,
                Err(Prompt::Eof) => false,
                Err(Prompt::Io(e)) => return Err(e),
            }
        } else {
            false
        };

        let wants_save = match (wants_save, self.protect_data_file, interactive) {
            (false, _, _) | (true, false, _) => wants_save,
            (true, true, true) => match self.confirm_overwrite() {
                Ok(yes) => yes,
                Err(Prompt::Eof) => false,
                Err(Prompt::Io(e)) => return Err(e),
            },
            (true, true, false) => {
                writeln!(self.out, "[\u{2717}] save skipped: {} was not loaded", self.paths.data_file.display())?;
                false
            }
        };

        if wants_save {
            if let Err(e) = storage::save(&self.store, &self.paths.data_file) {
                warn!(error = %e, "final save failed");
                writeln!(self.out, "[\u{2717}] save failed: {}", e)?;
            } else {
                writeln!(self.out, "[\u{2713}] Saved {} patient(s)", self.store.len())?;
            }
        }
        writeln!(self.out, "Exiting...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run_script(store: RecordStore, script: &str) -> (RecordStore, String) {
        let mut out = Vec::new();
        let mut session = Session::new(store, SessionPaths::default(), Cursor::new(script.as_bytes()), &mut out);
        session.run().unwrap();
        let store = session.into_store();
        (store, String::from_utf8(out).unwrap())
    }

    #[test]
    fn add_update_discharge_flow() {
        let script = "1\n1\nAnn\n30\nF\nflu\n2\n1\nfever\n3\n1\n6\n";
        let (store, out) = run_script(RecordStore::default(), script);

        let rec = store.find(1, true).unwrap();
        assert_eq!(rec.medical_history.as_str(), "flu; fever");
        assert!(rec.is_discharged);
        assert!(out.contains("Admitted Ann (ID 1)"));
        assert!(out.contains("Discharged ID 1"));
        assert!(out.contains("Status: Discharged"));
    }

    #[test]
    fn bad_input_is_reprompted() {
        let script = "banana\n1\nabc\n5\nBo\n200\n40\nz\nm\n\n4\n5\n";
        let (store, out) = run_script(RecordStore::default(), script);

        assert!(out.contains("Unknown choice: 'banana'"));
        assert!(out.contains("Expected a whole number, got 'abc'"));
        assert!(out.contains("gender must be one of M, F, O"));
        assert_eq!(store.find(5, false).map(|r| r.age), None);
        assert!(out.contains("add failed: invalid input: age must be between 1 and 120 (got 200)"));
    }

    #[test]
    fn store_errors_do_not_end_the_session() {
        let script = "3\n42\n2\n42\nx\n7\n42\n1\n9\nNed\n33\nO\n\n5\n";
        let (store, out) = run_script(RecordStore::default(), script);

        assert!(out.contains("discharge failed: no patient found with id 42"));
        assert!(out.contains("update history failed: no patient found with id 42"));
        assert!(out.contains("remove failed: no patient found with id 42"));
        assert_eq!(store.len(), 1);
        assert!(out.contains("Name: Ned"));
    }

    #[test]
    fn exit_saves_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SessionPaths {
            data_file: dir.path().join("patients.dat"),
            report_file: dir.path().join("patients.txt"),
            json_file: dir.path().join("patients.json"),
        };
        let script = "1\n1\nAnn\n30\nF\nflu\n0\ny\n";
        let mut out = Vec::new();
        let mut session = Session::new(RecordStore::default(), paths.clone(), Cursor::new(script.as_bytes()), &mut out);
        session.run().unwrap();

        let loaded = storage::load(&paths.data_file, crate::StoreConfig::default()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.find(1, false).unwrap().name, "Ann");
    }

    fn damaged_data_file(dir: &Path) -> PathBuf {
        let path = dir.join("patients.dat");
        let mut store = RecordStore::default();
        store.add(1, "Ann", 30, crate::Gender::Female, "flu").unwrap();
        store.add(2, "Bo", 40, crate::Gender::Male, "").unwrap();
        storage::save(&store, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();
        path
    }

    #[test]
    fn strict_open_of_damaged_file_starts_empty_and_protected() {
        let dir = tempfile::tempdir().unwrap();
        let path = damaged_data_file(dir.path());

        let opened = open_store(&path, StoreConfig::default(), true).unwrap();
        assert!(opened.store.is_empty());
        assert!(opened.protect_data_file);
        assert!(opened.notice.contains("Could not load"));

        let lenient = open_store(&path, StoreConfig::default(), false).unwrap();
        assert_eq!(lenient.store.len(), 1);
        assert!(!lenient.protect_data_file);
        assert!(lenient.notice.contains("is damaged"));

        let missing = open_store(&dir.path().join("none.dat"), StoreConfig::default(), true).unwrap();
        assert!(missing.store.is_empty());
        assert!(!missing.protect_data_file);
    }

    #[test]
    fn protected_file_is_kept_unless_confirmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = damaged_data_file(dir.path());
        let damaged = std::fs::read(&path).unwrap();
        let paths = SessionPaths { data_file: path.clone(), ..SessionPaths::default() };

        let opened = open_store(&path, StoreConfig::default(), true).unwrap();
        let mut out = Vec::new();
        let mut session = Session::new(opened.store, paths.clone(), Cursor::new("9\nn\n".as_bytes()), &mut out)
        .protect_data_file(opened.protect_data_file)
        .save_on_exit(true);
        session.run().unwrap();
        drop(session);
        assert_eq!(std::fs::read(&path).unwrap(), damaged);
        assert!(String::from_utf8(out).unwrap().contains("save skipped"));

        let mut out = Vec::new();
        let mut session = Session::new(RecordStore::default(), paths, Cursor::new("9\ny\n".as_bytes()), &mut out)
        .protect_data_file(true);
        session.run().unwrap();
        drop(session);
        assert!(storage::load(&path, StoreConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn eof_ends_without_saving() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SessionPaths { data_file: dir.path().join("p.dat"), ..SessionPaths::default() };
        let mut out = Vec::new();
        let mut session = Session::new(
            RecordStore::default(),
            paths.clone(),
            Cursor::new("1\n1\nAnn\n30\nF\n\n".as_bytes()),
            &mut out,
        );
        session.run().unwrap();
        drop(session);
        assert!(!paths.data_file.exists());
        assert!(String::from_utf8(out).unwrap().ends_with("Exiting...\n"));
    }
}
