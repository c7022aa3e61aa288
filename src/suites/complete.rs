//! `complete` suite: console, register access, hardware counting, GPIO

use super::{counter_command, BenchProfile};
use crate::core::dispatcher::Command;
use crate::core::suite::{Precondition, TestCase, TestSuite};
use crate::core::verify::{Expectation, Relation, Template, Tolerance};

const SHOW_COMMANDS: &[(&str, &str, &[&str])] = &[
    ("SH-01", "show config", &["Version:", "Unit-ID:"]),
    ("SH-02", "show counters", &["counter"]),
    ("SH-03", "show timers", &["timer"]),
    ("SH-04", "show registers", &["Reg"]),
    ("SH-05", "show registers 10 5", &["Reg"]),
    ("SH-06", "show coils", &["coil"]),
    ("SH-07", "show inputs", &["input"]),
    ("SH-08", "show version", &["Version:", "Build"]),
    ("SH-09", "show gpio", &["GPIO"]),
    ("SH-10", "show echo", &["echo"]),
    ("SH-11", "show reg", &["reg"]),
    ("SH-12", "show coil", &["coil"]),
];

/// Build the `complete` suite
pub fn complete(profile: &BenchProfile) -> TestSuite {
    let mut suite = TestSuite::new(
        "complete",
        "Console commands, register and coil access, hardware counting, GPIO mapping",
    );

    for (id, text, tokens) in SHOW_COMMANDS {
        let mut case = TestCase::new(*id, *text).send(*text, profile.show_wait);
        for token in *tokens {
            case = case.expect(Expectation::contains(*token));
        }
        suite = suite.case(case);
    }

    suite
        .case(write_register(profile, "RW-07", "write reg 100 value 12345", 12345.0))
        .case(write_coil(profile, "RW-10", "on", 1.0))
        .case(write_coil(profile, "RW-11", "off", 0.0))
        .case(counting(profile, "CNT-HW-01", "rising", 1.0))
        .case(frequency(profile))
        .case(counting(profile, "CNT-HW-03", "falling", 1.0))
        .case(counting(profile, "CNT-HW-04", "both", 2.0))
        .case(
            TestCase::new("GPIO-01", "Map GPIO 21 to coil 100")
                .send("set gpio 21 static map coil:100", profile.read_wait)
                .send("show gpio", profile.show_wait)
                .expect(Expectation::line_with_all(["GPIO 21", "COIL:100"])),
        )
        .case(
            TestCase::new("GPIO-03", "Remove GPIO 21 mapping")
                .send("no set gpio 21", profile.read_wait)
                .send("show gpio", profile.show_wait)
                .expect(Expectation::no_line_with_all(["GPIO 21", "COIL:100"])),
        )
        .case(
            TestCase::new("GPIO-05", "Return GPIO 2 to heartbeat")
                .send("set gpio 2 disable", profile.read_wait)
                .send("show gpio", profile.show_wait)
                .expect(Expectation::line_with_all(["GPIO 2", "HEARTBEAT"])),
        )
        .case(write_register(profile, "REG-ST-01", "set reg STATIC 100 Value 12345", 12345.0))
        .case(
            TestCase::new("COIL-ST-01", "Static coil config ON")
                .send("set coil STATIC 100 Value ON", profile.read_wait)
                .send("read coil 100 1", profile.read_wait)
                .expect(Expectation::numeric(Template::coil(100), 1.0, Tolerance::Absolute(0.0))),
        )
        .case(
            TestCase::new("SYS-10", "help command")
                .send("help", profile.configure_wait)
                .expect(Expectation::contains("Commands:")),
        )
        .case(
            TestCase::new("SYS-VERSION", "show version")
                .send("show version", profile.read_wait)
                .expect(Expectation::contains("Version:"))
                .expect(Expectation::matches(r"Build #\d+")),
        )
}

fn write_register(profile: &BenchProfile, id: &str, command: &str, value: f64) -> TestCase {
    TestCase::new(id, command)
        .send(command, profile.read_wait)
        .send("read reg 100 1", profile.read_wait)
        .expect(Expectation::numeric(Template::register(100), value, Tolerance::Absolute(0.0)))
}

fn write_coil(profile: &BenchProfile, id: &str, state: &str, value: f64) -> TestCase {
    let command = format!("write coil 100 value {state}");
    TestCase::new(id, command.clone())
        .send(command, profile.read_wait)
        .send("read coil 100 1", profile.read_wait)
        .expect(Expectation::numeric(Template::coil(100), value, Tolerance::Absolute(0.0)))
}

/// Count over the window and compare the rate with the bench signal
fn counting(profile: &BenchProfile, id: &str, edge: &str, multiplier: f64) -> TestCase {
    let expected = profile.signal_hz * multiplier;
    TestCase::new(id, format!("HW counting, {edge} edge @ {} Hz", profile.signal_hz))
        .send(
            counter_command(&format!(
                "edge:{edge} prescaler:1 index-reg:10 raw-reg:11 freq-reg:12 overload-reg:13 ctrl-reg:14"
            )),
            profile.configure_wait,
        )
        .send("write reg 14 value 1", profile.read_wait)
        .delay(profile.settle)
        .send("read reg 10 3", profile.read_wait)
        .probe("start", Template::register(10))
        .delay(profile.count_window)
        .send("read reg 10 3", profile.read_wait)
        .probe("end", Template::register(10))
        .relate(
            Relation::RateWithin {
                expected,
                tolerance: Tolerance::Percentage(0.05),
            },
            ["start", "end"],
        )
}

fn frequency(profile: &BenchProfile) -> TestCase {
    TestCase::new("CNT-HW-02", "Frequency measurement")
        .precondition(Precondition::new(
            "counter 1 configured",
            Command::new("show counters", profile.show_wait),
            Expectation::contains("counter 1: value="),
        ))
        .send("read reg 12 1", profile.read_wait)
        .expect(Expectation::numeric(
            Template::register(12),
            profile.signal_hz,
            Tolerance::Percentage(0.05),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::suite::Step;

    #[test]
    fn test_catalog_shape() {
        let suite = complete(&BenchProfile::default());
        assert_eq!(suite.len(), 26);
        assert_eq!(suite.cases[0].id, "SH-01");
        assert_eq!(suite.get("SH-01").unwrap().steps.len(), 3);
        assert_eq!(suite.get("CNT-HW-02").unwrap().preconditions.len(), 1);
    }

    #[test]
    fn test_both_edges_double_the_rate() {
        let profile = BenchProfile::hardware(1000.0);
        let case = counting(&profile, "CNT-HW-04", "both", 2.0);
        let relation = case.steps.iter().find_map(|s| match s {
            Step::Relate { relation, .. } => Some(relation.clone()),
            _ => None,
        });
        assert_eq!(
            relation,
            Some(Relation::RateWithin {
                expected: 2000.0,
                tolerance: Tolerance::Percentage(0.05)
            })
        );
        assert!(case.commands().any(|c| c.text.contains("edge:both")));
    }
}
