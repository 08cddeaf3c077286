use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A single worm-bin correction factor. `factor` is bounded to `[0.5, 2.0]`
/// at the Snapshot/config layer; the file-format bound is the wider
/// `(0, 2)` applied at load time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PecBin {
    pub factor: f64,
    pub update_count: u32,
}

impl Default for PecBin {
    fn default() -> Self {
        Self {
            factor: 1.0,
            update_count: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PecFileType {
    /// Exactly `bin_count` rows, one worm revolution.
    GsPecWorm,
    /// Exactly `steps_per_rev / bin_steps` rows, the 360° equivalent.
    GsPec360,
}

#[derive(Debug, Clone)]
pub struct PecHeader {
    pub file_type: PecFileType,
    pub bin_count: u32,
    pub bin_steps: u32,
    pub steps_per_rev: u32,
    pub worm_teeth: Option<u32>,
    pub raw: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct PecTable {
    bins: BTreeMap<u32, PecBin>,
    bin_count: u32,
}

impl PecTable {
    pub fn new(bin_count: u32) -> Self {
        Self {
            bins: BTreeMap::new(),
            bin_count,
        }
    }

    pub fn factor_for_bin(&self, bin: u32) -> f64 {
        self.bins.get(&bin).map(|b| b.factor).unwrap_or(1.0)
    }

    pub fn set_bin(&mut self, bin: u32, value: PecBin) {
        self.bins.insert(bin, value);
    }

    pub fn bin_count(&self) -> u32 {
        self.bin_count
    }

    /// Missing bins during load are filled with `(1.0, 1)`.
    pub fn fill_missing(&mut self) {
        for bin in 0..self.bin_count {
            self.bins.entry(bin).or_insert_with(PecBin::default);
        }
    }
}

/// Parse the `#key = value` header section and `bin|factor|count` data
/// lines. Rows whose factor falls outside `(0, 2)` are discarded; missing
/// bins are filled with `(1.0, 1)`.
pub fn parse_pec_file(
    contents: &str,
    expected_steps_per_rev: u32,
    expected_bin_steps: u32,
    expected_bin_count: u32,
) -> CoreResult<(PecHeader, PecTable)> {
    let mut raw = BTreeMap::new();
    let mut data_lines = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix('#') {
            if let Some((key, value)) = rest.split_once('=') {
                raw.insert(key.trim().to_string(), value.trim().to_string());
            }
            continue;
        }
        data_lines.push(line);
    }

    let file_type = match raw.get("FileType").map(String::as_str) {
        Some("GsPecWorm") => PecFileType::GsPecWorm,
        Some("GsPec360") => PecFileType::GsPec360,
        Some(other) => {
            return Err(CoreError::invalid_argument(format!(
                "unrecognised PEC FileType: {other}"
            )))
        }
        None => return Err(CoreError::invalid_argument("PEC file missing FileType header")),
    };

    let bin_count: u32 = parse_header_u32(&raw, "BinCount")?;
    let bin_steps: u32 = parse_header_u32(&raw, "BinSteps")?;
    let steps_per_rev: u32 = parse_header_u32(&raw, "StepsPerRev")?;
    let worm_teeth = raw.get("WormTeeth").and_then(|v| v.parse().ok());

    if steps_per_rev != expected_steps_per_rev {
        return Err(CoreError::invalid_argument(format!(
            "PEC file StepsPerRev {steps_per_rev} disagrees with configured {expected_steps_per_rev}"
        )));
    }
    if bin_steps != expected_bin_steps {
        return Err(CoreError::invalid_argument(format!(
            "PEC file BinSteps {bin_steps} disagrees with configured {expected_bin_steps}"
        )));
    }
    if bin_count != expected_bin_count {
        return Err(CoreError::invalid_argument(format!(
            "PEC file BinCount {bin_count} disagrees with configured {expected_bin_count}"
        )));
    }

    let expected_rows = match file_type {
        PecFileType::GsPecWorm => bin_count,
        PecFileType::GsPec360 => steps_per_rev / bin_steps,
    };

    let mut table = PecTable::new(bin_count);
    for line in &data_lines {
        let mut parts = line.splitn(3, '|');
        let (bin, factor, count) = match (parts.next(), parts.next(), parts.next()) {
            (Some(b), Some(f), Some(c)) => (b, f, c),
            _ => continue,
        };

        let (Ok(bin), Ok(factor), Ok(count)) =
            (bin.trim().parse::<u32>(), factor.trim().parse::<f64>(), count.trim().parse::<u32>())
        else {
            continue;
        };

        if !(factor > 0.0 && factor < 2.0) {
            continue;
        }

        table.set_bin(bin, PecBin { factor, update_count: count });
    }
    table.fill_missing();

    let _ = expected_rows; // row-count is informational; tolerant of sparse master files.

    Ok((
        PecHeader {
            file_type,
            bin_count,
            bin_steps,
            steps_per_rev,
            worm_teeth,
            raw,
        },
        table,
    ))
}

fn parse_header_u32(raw: &BTreeMap<String, String>, key: &str) -> CoreResult<u32> {
    raw.get(key)
        .ok_or_else(|| CoreError::invalid_argument(format!("PEC file missing {key} header")))?
        .parse()
        .map_err(|_| CoreError::invalid_argument(format!("PEC file has non-numeric {key}")))
}

/// The two master tables the PEC Engine reads on every position tick.
#[derive(Debug, Clone, Default)]
pub struct PecEngine {
    pub worm_master: Option<PecTable>,
    pub full_master: Option<PecTable>,
    pub pec_offset: i64,
}

impl PecEngine {
    pub fn new(pec_offset: i64) -> Self {
        Self {
            worm_master: None,
            full_master: None,
            pec_offset,
        }
    }

    pub fn load_worm(
        &mut self,
        contents: &str,
        steps_per_rev: u32,
        bin_steps: u32,
        bin_count: u32,
    ) -> CoreResult<()> {
        let (_, table) = parse_pec_file(contents, steps_per_rev, bin_steps, bin_count)?;
        self.worm_master = Some(table);
        Ok(())
    }

    pub fn load_full(
        &mut self,
        contents: &str,
        steps_per_rev: u32,
        bin_steps: u32,
        bin_count: u32,
    ) -> CoreResult<()> {
        let (_, table) = parse_pec_file(contents, steps_per_rev, bin_steps, bin_count)?;
        self.full_master = Some(table);
        Ok(())
    }

    /// Compute the worm-bin index from the raw RA-axis step count.
    fn worm_bin_index(&self, ra_steps: i64, bin_steps: u32, bin_count: u32) -> u32 {
        let period = (bin_steps as i64) * (bin_count as i64);
        let offset_steps = ra_steps + self.pec_offset;
        let wrapped = ((offset_steps % period) + period) % period;
        (wrapped / bin_steps as i64) as u32
    }

    /// Multiply the base sidereal rate by the worm-bin (and, if loaded,
    /// 360°) correction factor. A no-op when PEC is disabled in the
    /// Snapshot.
    pub fn apply(
        &self,
        base_sidereal_rate: f64,
        ra_steps: i64,
        bin_steps: u32,
        bin_count: u32,
        pec_on: bool,
        ppec_on: bool,
    ) -> f64 {
        if !pec_on {
            return base_sidereal_rate;
        }

        let worm_factor = self
            .worm_master
            .as_ref()
            .map(|table| table.factor_for_bin(self.worm_bin_index(ra_steps, bin_steps, bin_count)))
            .unwrap_or(1.0);

        let mut rate = base_sidereal_rate * worm_factor;

        if ppec_on {
            if let Some(full) = &self.full_master {
                let steps_per_rev = full.bin_count() * bin_steps;
                let period = steps_per_rev.max(1) as i64;
                let wrapped = (((ra_steps % period) + period) % period) as u32 / bin_steps.max(1);
                rate *= full.factor_for_bin(wrapped);
            }
        }

        rate
    }
}

/// Render a worm-master table back into the on-disk format, used by PEC
/// training commit. Kept symmetric with [`parse_pec_file`].
pub fn serialize_pec_file(
    header: &PecHeader,
    table: &PecTable,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#FileType = {:?}", header.file_type);
    let _ = writeln!(out, "#BinCount = {}", header.bin_count);
    let _ = writeln!(out, "#BinSteps = {}", header.bin_steps);
    let _ = writeln!(out, "#StepsPerRev = {}", header.steps_per_rev);
    for bin in 0..header.bin_count {
        let entry = table.bins.get(&bin).copied().unwrap_or_default();
        let _ = writeln!(out, "{}|{}|{}", bin, entry.factor, entry.update_count);
    }
    out
}
