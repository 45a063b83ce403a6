// PCHASE-SWEEP RESULT AGGREGATOR
// FOLDS ONE COMBINATION'S RUNS (IN SWEEP ORDER) INTO ONE ARTIFACT
//
// PIVOT: LAST TWO FIELDS OF EACH RUN'S FINAL ROW -> ONE ROW PER STRIDE
//   ,core 0(victim), core 1
//   access,load,store
//   numa node,0,1
//   cacheline number,memory latency (ns),memory bandwidth (MB/s)
//   1,95.12,672.950
//   2,97.40,657.218
//
// RAW: EVERY RUN VERBATIM, EACH PRECEDED BY A LENGTH-FRAMED MARKER
//   # access,load,store
//   # placement,inter,4
//   # numa node,1
//   <header invocation output, if any>
//   # run,1,412
//   <412 bytes of stdout>

use crate::error::{Result, SweepError};
use crate::invoke::RunResult;
use crate::matrix::{AggregateMode, Combination, MatrixPoint, Study};
use crate::pattern::{Placement, StridePoint};

pub const PIVOT_COLUMNS: &str = "cacheline number,memory latency (ns),memory bandwidth (MB/s)";
pub const RAW_MARKER: &str = "# run,";
// EVERY LINE A RawCapture ADDS AROUND THE PAYLOADS STARTS WITH THIS
pub const CAPTURE_PREFIX: &str = "# ";

// FIXED PARAMETERS OF A COMBINATION, ONE CSV-ISH LINE EACH
fn describe(study: &Study, combo: &Combination) -> Vec<String> {
    let access = format!("access,{},{}", combo.access.victim, combo.access.aggressor);
    match combo.placement {
        Placement::Binding(b) => vec![
            ",core 0(victim), core 1".to_string(),
            access,
            format!(
                "numa node,{},{}",
                b.victim.resolve(study.baseline_node),
                b.aggressor.resolve(study.baseline_node)
            ),
        ],
        Placement::Topology(t) => vec![
            ",core 0(victim),aggressors".to_string(),
            access,
            format!("placement,{},{}", t.kind.label(), t.threads),
            format!("numa node,{}", study.node),
        ],
    }
}

/// Latency and bandwidth: the last two fields of the final data row.
pub fn trailing_fields(result: &RunResult) -> Result<(String, String)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(result.as_str().as_bytes());

    let mut last = None;
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        last = Some(record);
    }
    let row = last.ok_or_else(|| SweepError::CsvParse("no data rows".to_string()))?;
    if row.len() < 2 {
        return Err(SweepError::CsvParse(format!(
            "final row has {} field(s), need latency and bandwidth",
            row.len()
        )));
    }

    let latency = row[row.len() - 2].trim().to_string();
    let bandwidth = row[row.len() - 1].trim().to_string();
    for (name, value) in [("latency", &latency), ("bandwidth", &bandwidth)] {
        if value.parse::<f64>().is_err() {
            return Err(SweepError::CsvParse(format!("{} '{}' is not numeric", name, value)));
        }
    }
    Ok((latency, bandwidth))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRow {
    pub stride: StridePoint,
    pub latency: String,
    pub bandwidth: String,
}

/// Pivoted table for one combination: one row per stride, sweep order.
#[derive(Clone, Debug)]
pub struct StudyTable {
    header: Vec<String>,
    rows: Vec<TableRow>,
}

impl StudyTable {
    pub fn new(study: &Study, combo: &Combination) -> Self {
        Self {
            header: describe(study, combo),
            rows: Vec::with_capacity(study.strides.len()),
        }
    }

    pub fn push(&mut self, stride: StridePoint, result: &RunResult) -> Result<()> {
        let (latency, bandwidth) = trailing_fields(result)?;
        self.rows.push(TableRow { stride, latency, bandwidth });
        Ok(())
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.header {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(PIVOT_COLUMNS);
        out.push('\n');
        for row in &self.rows {
            out.push_str(&format!("{},{},{}\n", row.stride, row.latency, row.bandwidth));
        }
        out
    }
}

/// Raw pass-through capture for one combination.
#[derive(Clone, Debug)]
pub struct RawCapture {
    header: Vec<String>,
    columns: Option<String>,
    runs: Vec<(StridePoint, String)>,
}

impl RawCapture {
    pub fn new(study: &Study, combo: &Combination) -> Self {
        Self {
            header: describe(study, combo),
            columns: None,
            runs: Vec::with_capacity(study.strides.len()),
        }
    }

    pub fn set_columns(&mut self, header: RunResult) {
        self.columns = Some(header.into_string());
    }

    pub fn push(&mut self, stride: StridePoint, result: RunResult) {
        self.runs.push((stride, result.into_string()));
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.header {
            out.push_str(CAPTURE_PREFIX);
            out.push_str(line);
            out.push('\n');
        }
        if let Some(cols) = &self.columns {
            out.push_str(cols);
        }
        for (stride, payload) in &self.runs {
            out.push_str(&format!("{}{},{}\n", RAW_MARKER, stride, payload.len()));
            out.push_str(payload);
        }
        out
    }
}

/// Reverse of `RawCapture::render`: (stride label, payload) per run, in order.
pub fn split_raw(text: &str) -> Result<Vec<(String, String)>> {
    let mut runs = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let rest = &text[pos..];
        let line_end = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
        let line = &rest[..line_end];
        pos += line_end;

        let marker = match line.strip_prefix(RAW_MARKER) {
            Some(m) => m.trim_end(),
            None => continue,
        };
        let (label, bytes) = marker
            .rsplit_once(',')
            .ok_or_else(|| SweepError::CsvParse(format!("bad run marker '{}'", line.trim_end())))?;
        let bytes: usize = bytes
            .parse()
            .map_err(|_| SweepError::CsvParse(format!("bad run length '{}'", bytes)))?;
        let payload = pos
            .checked_add(bytes)
            .and_then(|end| text.get(pos..end))
            .ok_or_else(|| {
                SweepError::CsvParse(format!("run {} claims {} bytes past end of capture", label, bytes))
            })?;
        runs.push((label.to_string(), payload.to_string()));
        pos += bytes;
    }
    Ok(runs)
}

/// One combination's accumulator. Rows must arrive in sweep order.
pub enum Aggregator {
    Pivot(StudyTable),
    Raw(RawCapture),
}

impl Aggregator {
    pub fn new(study: &Study, combo: &Combination) -> Self {
        match study.mode {
            AggregateMode::Pivot => Self::Pivot(StudyTable::new(study, combo)),
            AggregateMode::Raw => Self::Raw(RawCapture::new(study, combo)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Pivot(t) => t.rows().len(),
            Self::Raw(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_columns(&mut self, header: RunResult) {
        if let Self::Raw(r) = self {
            r.set_columns(header);
        }
    }

    pub fn push(&mut self, point: &MatrixPoint, result: RunResult) -> Result<()> {
        if point.index != self.len() {
            return Err(SweepError::InvalidStudy(format!(
                "{} arrived at row {}, expected sweep position {}",
                point,
                self.len(),
                point.index
            )));
        }
        match self {
            Self::Pivot(t) => t.push(point.stride, &result),
            Self::Raw(r) => {
                r.push(point.stride, result);
                Ok(())
            }
        }
    }

    pub fn finish(self) -> String {
        match self {
            Self::Pivot(t) => t.render(),
            Self::Raw(r) => r.render(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::OutputLayout;
    use crate::pattern::{
        AccessPair, AccessPattern, ByteSize, Node, NodeBinding, ThreadTopology, TopologyKind,
    };

    fn study(mode: AggregateMode, placement: Placement) -> Study {
        Study {
            name: "unit".to_string(),
            access: vec![AccessPair::new(AccessPattern::Load, AccessPattern::Store)],
            placements: vec![placement],
            strides: vec![StridePoint::aggressor(1), StridePoint::aggressor(2), StridePoint::aggressor(4)],
            node: 1,
            baseline_node: 0,
            victim_size: ByteSize::mib(1),
            aggressor_size: ByteSize::mib(2),
            duration_secs: 3.0,
            mode,
            header: false,
            layout: OutputLayout::PerCombination,
        }
    }

    fn binding() -> Placement {
        Placement::Binding(NodeBinding::new(Node::Baseline, Node::Id(1)))
    }

    // TWO THREAD ROWS, SHAPED LIKE THE TOOL'S CSV MODE (TRAILING FIELDS ONLY MATTER)
    fn run_output(lat: f64, bw: f64) -> RunResult {
        RunResult::new(format!(
            "8,64,4096,\"0:0;1:1\",3.000,1.25,{:.2},{:.3}\n8,64,4096,\"0:0;1:1\",3.000,1.25,{:.2},{:.3}\n",
            lat + 100.0,
            bw / 2.0,
            lat,
            bw
        ))
    }

    #[test]
    fn trailing_fields_from_final_row() {
        let (lat, bw) = trailing_fields(&run_output(95.5, 700.0)).unwrap();
        assert_eq!(lat, "95.50");
        assert_eq!(bw, "700.000");
    }

    #[test]
    fn trailing_fields_rejects_short_or_garbage() {
        assert!(trailing_fields(&RunResult::new("42\n")).is_err());
        assert!(trailing_fields(&RunResult::new("\n\n")).is_err());
        assert!(matches!(
            trailing_fields(&RunResult::new("a,b,latency,bandwidth\n")),
            Err(SweepError::CsvParse(_))
        ));
    }

    #[test]
    fn pivot_table_rows_follow_sweep() {
        let s = study(AggregateMode::Pivot, binding());
        let combo = &s.combinations()[0];
        let mut agg = Aggregator::new(&s, combo);
        for (i, p) in s.points_for(combo.clone()).enumerate() {
            agg.push(&p, run_output(90.0 + i as f64, 600.0)).unwrap();
        }
        assert_eq!(
            agg.finish(),
            ",core 0(victim), core 1\n\
             access,load,store\n\
             numa node,0,1\n\
             cacheline number,memory latency (ns),memory bandwidth (MB/s)\n\
             1,90.00,600.000\n\
             2,91.00,600.000\n\
             4,92.00,600.000\n"
        );
    }

    #[test]
    fn out_of_order_push_is_rejected() {
        let s = study(AggregateMode::Pivot, binding());
        let combo = &s.combinations()[0];
        let mut agg = Aggregator::new(&s, combo);
        let third = s.points_for(combo.clone()).nth(2).unwrap();
        assert!(agg.push(&third, run_output(1.0, 1.0)).is_err());
        assert!(agg.is_empty());
    }

    #[test]
    fn raw_capture_round_trips() {
        let s = study(
            AggregateMode::Raw,
            Placement::Topology(ThreadTopology::new(TopologyKind::Inter, 4)),
        );
        let combo = &s.combinations()[0];
        let mut agg = Aggregator::new(&s, combo);
        agg.set_columns(RunResult::new("pointer size (bytes),memory latency (ns)\n"));

        let mut payloads = Vec::new();
        for (i, p) in s.points_for(combo.clone()).enumerate() {
            // PAYLOAD THAT LOOKS LIKE A MARKER MUST NOT CONFUSE THE SPLITTER
            let text = format!("# run,9,9\n{},{}\n", i, i * 10);
            payloads.push(text.clone());
            agg.push(&p, RunResult::new(text)).unwrap();
        }
        let text = agg.finish();
        assert!(text.starts_with("# ,core 0(victim),aggressors\n# access,load,store\n# placement,inter,4\n# numa node,1\n"));

        let runs = split_raw(&text).unwrap();
        let labels: Vec<&str> = runs.iter().map(|(l, _)| l.as_str()).collect();
        let bodies: Vec<String> = runs.iter().map(|(_, b)| b.clone()).collect();
        assert_eq!(labels, vec!["1", "2", "4"]);
        assert_eq!(bodies, payloads);
    }

    #[test]
    fn split_raw_rejects_overlong_frame() {
        assert!(split_raw("# run,1,500\nshort\n").is_err());
        assert!(split_raw("# run,1,x\n").is_err());
        assert!(matches!(
            split_raw("# run,1,18446744073709551615\nabc\n"),
            Err(SweepError::CsvParse(_))
        ));
    }

    #[test]
    fn split_raw_ignores_plain_csv() {
        assert!(split_raw("a,b\n1,2\n").unwrap().is_empty());
    }
}
