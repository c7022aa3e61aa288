//! Virtual Device Simulator
//!
//! An in-process stand-in for the Modbus server firmware. It understands the
//! same line-oriented command grammar as the real device (set/write/read/show,
//! save/load, set id) and models the parts of the device the suites observe:
//! holding registers, coils, a hardware pulse counter fed by a bench signal,
//! an astable timer, dynamic register/coil mapping, GPIO mapping and a
//! persisted configuration snapshot.
//!
//! Counters and timers advance with wall-clock time, so reads separated by a
//! delay see the phenomenon accumulate exactly as on hardware.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Static characteristics of the simulated device and its test bench
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    /// Firmware version string reported by `show version`
    pub firmware: String,
    /// Build number
    pub build: u32,
    /// Initial protocol address
    pub unit_id: u8,
    /// Frequency of the bench signal wired to the counter input (Hz)
    pub signal_hz: f64,
    /// Relative random deviation applied to each counter read
    pub count_jitter: f64,
    /// Echo each received command before answering
    pub echo: bool,
    /// RNG seed, so simulated jitter is reproducible
    pub seed: u64,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            firmware: "v1.0.0".to_string(),
            build: 116,
            unit_id: 20,
            signal_hz: 1000.0,
            count_jitter: 0.002,
            echo: false,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Rising,
    Falling,
    Both,
}

impl Edge {
    fn multiplier(self) -> f64 {
        match self {
            Self::Rising | Self::Falling => 1.0,
            Self::Both => 2.0,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Both => "both",
        }
    }
}

#[derive(Debug, Clone)]
struct CounterState {
    edge: Edge,
    prescaler: u32,
    scale: f64,
    count_down: bool,
    start_value: i64,
    index_reg: Option<u16>,
    raw_reg: Option<u16>,
    freq_reg: Option<u16>,
    overload_reg: Option<u16>,
    ctrl_reg: Option<u16>,
    /// Pulses accumulated before `running_since`
    accumulated: f64,
    running_since: Option<Instant>,
}

impl CounterState {
    fn pulses(&self, now: Instant, signal_hz: f64) -> f64 {
        let live = self
            .running_since
            .map(|since| now.saturating_duration_since(since).as_secs_f64() * signal_hz * self.edge.multiplier())
            .unwrap_or(0.0);
        self.accumulated + live
    }

    fn reset(&mut self, now: Instant) {
        self.accumulated = 0.0;
        if self.running_since.is_some() {
            self.running_since = Some(now);
        }
    }

    fn stop(&mut self, now: Instant, signal_hz: f64) {
        self.accumulated = self.pulses(now, signal_hz);
        self.running_since = None;
    }

    fn start(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }
}

#[derive(Debug, Clone)]
struct TimerState {
    on: Duration,
    off: Duration,
    output_coil: u16,
    since: Instant,
}

impl TimerState {
    fn output(&self, now: Instant) -> bool {
        let period = (self.on + self.off).as_millis().max(1);
        let phase = now.saturating_duration_since(self.since).as_millis() % period;
        phase < self.on.as_millis()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DynamicSource {
    CounterValue(u8),
    CounterRaw(u8),
    CounterFreq(u8),
    TimerOutput(u8),
}

impl DynamicSource {
    fn parse(source: &str) -> Option<Self> {
        let (subject, field) = source.to_lowercase().split_once(':').map(|(a, b)| (a.to_string(), b.to_string()))?;
        if let Some(id) = subject.strip_prefix("counter") {
            let id = id.parse().ok()?;
            return match field.as_str() {
                "value" | "index" => Some(Self::CounterValue(id)),
                "raw" => Some(Self::CounterRaw(id)),
                "freq" => Some(Self::CounterFreq(id)),
                _ => None,
            };
        }
        if let Some(id) = subject.strip_prefix("timer") {
            let id = id.parse().ok()?;
            return (field == "output").then_some(Self::TimerOutput(id));
        }
        None
    }
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    registers: BTreeMap<u16, u16>,
    coils: BTreeMap<u16, bool>,
    unit_id: u8,
}

struct DeviceState {
    profile: DeviceProfile,
    unit_id: u8,
    registers: BTreeMap<u16, u16>,
    coils: BTreeMap<u16, bool>,
    counters: HashMap<u8, CounterState>,
    timers: HashMap<u8, TimerState>,
    dynamic_regs: BTreeMap<u16, DynamicSource>,
    dynamic_coils: BTreeMap<u16, DynamicSource>,
    gpio_map: BTreeMap<u8, String>,
    heartbeat_gpio: bool,
    saved: Option<Snapshot>,
    rng: StdRng,
    commands_seen: Vec<String>,
}

/// Simulated device, cheap to clone (all clones share state)
#[derive(Clone)]
pub struct VirtualDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl std::fmt::Debug for VirtualDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("VirtualDevice")
            .field("firmware", &state.profile.firmware)
            .field("unit_id", &state.unit_id)
            .finish_non_exhaustive()
    }
}

impl Default for VirtualDevice {
    fn default() -> Self {
        Self::new(DeviceProfile::default())
    }
}

impl VirtualDevice {
    /// Create a device with the given profile
    pub fn new(profile: DeviceProfile) -> Self {
        let rng = StdRng::seed_from_u64(profile.seed);
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                unit_id: profile.unit_id,
                profile,
                registers: BTreeMap::new(),
                coils: BTreeMap::new(),
                counters: HashMap::new(),
                timers: HashMap::new(),
                dynamic_regs: BTreeMap::new(),
                dynamic_coils: BTreeMap::new(),
                gpio_map: BTreeMap::new(),
                heartbeat_gpio: true,
                saved: None,
                rng,
                commands_seen: Vec::new(),
            })),
        }
    }

    /// Current protocol address
    pub fn unit_id(&self) -> u8 {
        self.state.lock().unit_id
    }

    /// Stored (non-live) holding register value
    pub fn register(&self, addr: u16) -> Option<u16> {
        self.state.lock().registers.get(&addr).copied()
    }

    /// Every command line the device has processed, in order
    pub fn commands_seen(&self) -> Vec<String> {
        self.state.lock().commands_seen.clone()
    }

    /// Handle one command line and return the response lines
    pub fn handle_line(&self, line: &str) -> Vec<String> {
        self.handle_line_at(line, Instant::now())
    }

    /// Handle one command line as if received at `now`
    pub fn handle_line_at(&self, line: &str, now: Instant) -> Vec<String> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        let mut state = self.state.lock();
        state.commands_seen.push(line.to_string());
        trace!(command = line, "virtual device received command");

        let mut out = Vec::new();
        if state.profile.echo {
            out.push(format!("> {line}"));
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let handled = match tokens.as_slice() {
            ["help", ..] => {
                state.help(&mut out);
                true
            }
            ["save"] => {
                state.saved = Some(state.snapshot());
                out.push("[OK] Configuration saved to NVS".to_string());
                true
            }
            ["load"] => state.load(&mut out),
            ["show", rest @ ..] => state.show(rest, now, &mut out),
            ["read", kind, addr, rest @ ..] => state.read(kind, addr, rest.first().copied(), now, &mut out),
            ["write", kind, addr, value_kw, value] if value_kw.eq_ignore_ascii_case("value") => {
                state.write(kind, addr, value, now, &mut out)
            }
            ["set", "id", id] => state.set_id(id, &mut out),
            ["set", "counter", id, rest @ ..] => state.set_counter(id, rest, now, &mut out),
            ["set", "timer", id, rest @ ..] => state.set_timer(id, rest, now, &mut out),
            ["set", kind @ ("reg" | "coil"), mode, addr, rest @ ..] => {
                state.set_mapping(kind, mode, addr, rest, &mut out)
            }
            ["set", "gpio", pin, rest @ ..] => state.set_gpio(pin, rest, &mut out),
            ["no", "set", "gpio", pin] => state.remove_gpio(pin, &mut out),
            _ => false,
        };

        if !handled {
            out.push(format!("[ERROR] Unknown command: '{line}'"));
        }
        out
    }
}

fn parse_params<'a>(tokens: &[&'a str]) -> HashMap<String, &'a str> {
    tokens
        .iter()
        .filter_map(|t| t.split_once(':'))
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect()
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "1" | "true" => Some(true),
        "off" | "0" | "false" => Some(false),
        _ => None,
    }
}

impl DeviceState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            registers: self.registers.clone(),
            coils: self.coils.clone(),
            unit_id: self.unit_id,
        }
    }

    fn load(&mut self, out: &mut Vec<String>) -> bool {
        match self.saved.clone() {
            Some(snapshot) => {
                self.registers = snapshot.registers;
                self.coils = snapshot.coils;
                self.unit_id = snapshot.unit_id;
                out.push("[OK] Configuration loaded from NVS".to_string());
            }
            None => out.push("[ERROR] No saved configuration in NVS".to_string()),
        }
        true
    }

    fn counter_value(&mut self, id: u8, now: Instant) -> Option<(i64, u64, u64)> {
        let signal_hz = self.profile.signal_hz;
        let jitter = self.profile.count_jitter;
        let factor = if jitter > 0.0 {
            1.0 + self.rng.gen_range(-jitter..=jitter)
        } else {
            1.0
        };
        let counter = self.counters.get(&id)?;
        let pulses = (counter.pulses(now, signal_hz) * factor).max(0.0);
        let prescaler = f64::from(counter.prescaler.max(1));
        let raw = (pulses / prescaler).floor();
        let scaled = (raw * prescaler * counter.scale).round() as i64;
        let value = if counter.count_down {
            (counter.start_value - scaled).max(0)
        } else {
            counter.start_value + scaled
        };
        let freq = if counter.running_since.is_some() {
            (signal_hz * counter.edge.multiplier()).round() as u64
        } else {
            0
        };
        Some((value, raw as u64, freq))
    }

    fn resolve(&mut self, source: DynamicSource, now: Instant) -> i64 {
        match source {
            DynamicSource::CounterValue(id) => self.counter_value(id, now).map_or(0, |c| c.0),
            DynamicSource::CounterRaw(id) => self.counter_value(id, now).map_or(0, |c| c.1 as i64),
            DynamicSource::CounterFreq(id) => self.counter_value(id, now).map_or(0, |c| c.2 as i64),
            DynamicSource::TimerOutput(id) => self
                .timers
                .get(&id)
                .map_or(0, |t| i64::from(t.output(now))),
        }
    }

    fn live_register(&mut self, addr: u16, now: Instant) -> i64 {
        let counter_hit = self.counters.iter().find_map(|(id, c)| {
            if c.index_reg == Some(addr) {
                Some((*id, 0))
            } else if c.raw_reg == Some(addr) {
                Some((*id, 1))
            } else if c.freq_reg == Some(addr) {
                Some((*id, 2))
            } else if c.overload_reg == Some(addr) {
                Some((*id, 3))
            } else {
                None
            }
        });
        if let Some((id, field)) = counter_hit {
            return match (field, self.counter_value(id, now)) {
                (0, Some((value, _, _))) => value,
                (1, Some((_, raw, _))) => raw as i64,
                (2, Some((_, _, freq))) => freq as i64,
                _ => 0,
            };
        }
        if let Some(source) = self.dynamic_regs.get(&addr).copied() {
            return self.resolve(source, now);
        }
        i64::from(self.registers.get(&addr).copied().unwrap_or(0))
    }

    fn live_coil(&mut self, addr: u16, now: Instant) -> bool {
        if let Some(timer) = self.timers.values().find(|t| t.output_coil == addr) {
            return timer.output(now);
        }
        if let Some(source) = self.dynamic_coils.get(&addr).copied() {
            return self.resolve(source, now) != 0;
        }
        self.coils.get(&addr).copied().unwrap_or(false)
    }

    fn read(&mut self, kind: &str, addr: &str, count: Option<&str>, now: Instant, out: &mut Vec<String>) -> bool {
        let Ok(start) = addr.parse::<u16>() else {
            out.push(format!("READ: invalid address '{addr}'"));
            return true;
        };
        let count = count.and_then(|c| c.parse::<u16>().ok()).unwrap_or(1).max(1);
        let end = start.saturating_add(count - 1);
        match kind {
            "reg" => {
                out.push("=== READING HOLDING REGISTERS ===".to_string());
                out.push(format!("Address {start} to {end}:"));
                for addr in start..=end {
                    let value = self.live_register(addr, now);
                    out.push(format!("Reg[{addr}]: {value}"));
                }
                true
            }
            "coil" => {
                out.push("=== READING COILS ===".to_string());
                out.push(format!("Address {start} to {end}:"));
                for addr in start..=end {
                    let value = self.live_coil(addr, now);
                    out.push(format!("Coil[{addr}]: {}", u8::from(value)));
                }
                true
            }
            _ => false,
        }
    }

    fn write(&mut self, kind: &str, addr: &str, value: &str, now: Instant, out: &mut Vec<String>) -> bool {
        let Ok(addr) = addr.parse::<u16>() else {
            out.push(format!("WRITE: invalid address '{addr}'"));
            return true;
        };
        match kind {
            "reg" => {
                let Ok(raw) = value.parse::<u32>() else {
                    out.push(format!("WRITE REG: invalid value '{value}'"));
                    return true;
                };
                let signal_hz = self.profile.signal_hz;
                let controlled: Vec<u8> = self
                    .counters
                    .iter()
                    .filter(|(_, c)| c.ctrl_reg == Some(addr))
                    .map(|(id, _)| *id)
                    .collect();
                if controlled.is_empty() {
                    self.registers.insert(addr, raw as u16);
                } else {
                    for id in controlled {
                        if let Some(counter) = self.counters.get_mut(&id) {
                            if raw & 0b001 != 0 {
                                counter.reset(now);
                            }
                            if raw & 0b010 != 0 {
                                counter.start(now);
                            }
                            if raw & 0b100 != 0 {
                                counter.stop(now, signal_hz);
                            }
                        }
                    }
                    // control bits are self-clearing
                    self.registers.insert(addr, 0);
                }
                out.push(format!("[OK] Reg[{addr}] = {}", raw as u16));
                true
            }
            "coil" => {
                let Some(on) = parse_on_off(value) else {
                    out.push(format!("WRITE COIL: invalid value '{value}'"));
                    return true;
                };
                self.coils.insert(addr, on);
                out.push(format!("[OK] Coil[{addr}] = {}", if on { "ON" } else { "OFF" }));
                true
            }
            _ => false,
        }
    }

    fn set_id(&mut self, id: &str, out: &mut Vec<String>) -> bool {
        match id.parse::<u8>() {
            Ok(id) if (1..=247).contains(&id) => {
                self.unit_id = id;
                out.push(format!("[OK] Unit-ID set to {id}"));
            }
            _ => out.push(format!("SET ID: invalid id '{id}' (1-247)")),
        }
        true
    }

    fn set_counter(&mut self, id: &str, rest: &[&str], now: Instant, out: &mut Vec<String>) -> bool {
        let Ok(id) = id.parse::<u8>() else {
            out.push(format!("SET COUNTER: invalid id '{id}'"));
            return true;
        };
        let params = parse_params(rest);
        let reg = |key: &str| params.get(key).and_then(|v| v.parse::<u16>().ok());
        let edge = match params.get("edge").map(|e| e.to_lowercase()) {
            Some(e) if e == "falling" => Edge::Falling,
            Some(e) if e == "both" => Edge::Both,
            _ => Edge::Rising,
        };
        let counter = CounterState {
            edge,
            prescaler: params.get("prescaler").and_then(|v| v.parse().ok()).unwrap_or(1),
            scale: params.get("scale").and_then(|v| v.parse().ok()).unwrap_or(1.0),
            count_down: params.get("direction").is_some_and(|d| d.eq_ignore_ascii_case("down")),
            start_value: params.get("start-value").and_then(|v| v.parse().ok()).unwrap_or(0),
            index_reg: reg("index-reg"),
            raw_reg: reg("raw-reg"),
            freq_reg: reg("freq-reg"),
            overload_reg: reg("overload-reg"),
            ctrl_reg: reg("ctrl-reg"),
            accumulated: 0.0,
            running_since: Some(now),
        };
        out.push(format!(
            "[OK] Counter {id} configured: edge={} prescaler={} scale={}",
            counter.edge.name(),
            counter.prescaler,
            counter.scale
        ));
        self.counters.insert(id, counter);
        true
    }

    fn set_timer(&mut self, id: &str, rest: &[&str], now: Instant, out: &mut Vec<String>) -> bool {
        let Ok(id) = id.parse::<u8>() else {
            out.push(format!("SET TIMER: invalid id '{id}'"));
            return true;
        };
        let params = parse_params(rest);
        let ms = |key: &str| params.get(key).and_then(|v| v.parse::<u64>().ok());
        let (Some(on), Some(off), Some(coil)) = (ms("on"), ms("off"), ms("output-coil")) else {
            out.push("SET TIMER: mode 3 requires on:<ms> off:<ms> output-coil:<addr>".to_string());
            return true;
        };
        self.timers.insert(
            id,
            TimerState {
                on: Duration::from_millis(on),
                off: Duration::from_millis(off),
                output_coil: coil as u16,
                since: now,
            },
        );
        out.push(format!("[OK] Timer {id} configured: astable on={on}ms off={off}ms coil={coil}"));
        true
    }

    fn set_mapping(&mut self, kind: &str, mode: &str, addr: &str, rest: &[&str], out: &mut Vec<String>) -> bool {
        let Ok(addr) = addr.parse::<u16>() else {
            out.push(format!("SET {}: invalid address '{addr}'", kind.to_uppercase()));
            return true;
        };
        match (mode.to_lowercase().as_str(), rest) {
            ("static", [value_kw, value]) if value_kw.eq_ignore_ascii_case("value") => {
                if kind == "reg" {
                    match value.parse::<u32>() {
                        Ok(v) => {
                            self.registers.insert(addr, v as u16);
                            out.push(format!("[OK] Reg {addr} STATIC = {v}"));
                        }
                        Err(_) => out.push(format!("SET REG: invalid value '{value}'")),
                    }
                } else {
                    match parse_on_off(value) {
                        Some(on) => {
                            self.coils.insert(addr, on);
                            out.push(format!("[OK] Coil {addr} STATIC = {}", if on { "ON" } else { "OFF" }));
                        }
                        None => out.push(format!("SET COIL: invalid value '{value}'")),
                    }
                }
            }
            ("dynamic", [source]) => match DynamicSource::parse(source) {
                Some(src) => {
                    if kind == "reg" {
                        self.dynamic_regs.insert(addr, src);
                    } else {
                        self.dynamic_coils.insert(addr, src);
                    }
                    out.push(format!("[OK] {} {addr} DYNAMIC -> {source}", kind.to_uppercase()));
                }
                None => out.push(format!("SET {}: unknown source '{source}'", kind.to_uppercase())),
            },
            _ => out.push(format!("SET {}: usage set {kind} STATIC|DYNAMIC <addr> ...", kind.to_uppercase())),
        }
        true
    }

    fn set_gpio(&mut self, pin: &str, rest: &[&str], out: &mut Vec<String>) -> bool {
        let Ok(pin) = pin.parse::<u8>() else {
            out.push(format!("SET GPIO: invalid pin '{pin}'"));
            return true;
        };
        match rest {
            ["disable"] if pin == 2 => {
                self.heartbeat_gpio = true;
                out.push("[OK] GPIO 2 returned to HEARTBEAT".to_string());
            }
            ["enable"] if pin == 2 => {
                self.heartbeat_gpio = false;
                out.push("[OK] GPIO 2 available for user mapping".to_string());
            }
            ["static", "map", target] => {
                self.gpio_map.insert(pin, target.to_uppercase());
                out.push(format!("[OK] GPIO {pin} mapped to {}", target.to_uppercase()));
            }
            _ => out.push("SET GPIO: usage set gpio <pin> static map coil:<addr>|disable|enable".to_string()),
        }
        true
    }

    fn remove_gpio(&mut self, pin: &str, out: &mut Vec<String>) -> bool {
        match pin.parse::<u8>() {
            Ok(pin) => {
                self.gpio_map.remove(&pin);
                out.push(format!("[OK] GPIO {pin} mapping removed"));
            }
            Err(_) => out.push(format!("NO SET GPIO: invalid pin '{pin}'")),
        }
        true
    }

    fn show(&mut self, rest: &[&str], now: Instant, out: &mut Vec<String>) -> bool {
        let version = format!("Version: {} Build #{}", self.profile.firmware, self.profile.build);
        match rest {
            ["config"] => {
                out.push("=== CONFIGURATION ===".to_string());
                out.push(version);
                out.push(format!("Unit-ID: {}", self.unit_id));
                out.push("Baudrate: 115200".to_string());
            }
            ["version"] => out.push(version),
            ["counters"] | ["counter", ..] => {
                for id in 1..=4u8 {
                    match self.counter_value(id, now) {
                        Some((value, raw, freq)) => {
                            out.push(format!("counter {id}: value={value} raw={raw} freq={freq}Hz"));
                        }
                        None => out.push(format!("counter {id}: not configured")),
                    }
                }
            }
            ["timers"] | ["timer", ..] => {
                for id in 1..=4u8 {
                    match self.timers.get(&id) {
                        Some(t) => out.push(format!(
                            "timer {id}: astable on={}ms off={}ms coil={}",
                            t.on.as_millis(),
                            t.off.as_millis(),
                            t.output_coil
                        )),
                        None => out.push(format!("timer {id}: not configured")),
                    }
                }
            }
            ["registers", args @ ..] => {
                let start = args.first().and_then(|a| a.parse::<u16>().ok()).unwrap_or(0);
                let count = args.get(1).and_then(|a| a.parse::<u16>().ok()).unwrap_or(16).max(1);
                for addr in start..start.saturating_add(count) {
                    let value = self.live_register(addr, now);
                    out.push(format!("Reg[{addr}]: {value}"));
                }
            }
            ["coils"] => {
                let bits: String = (0..16u16).map(|a| if self.live_coil(a, now) { '1' } else { '0' }).collect();
                out.push(format!("coil 0-15: {bits}"));
            }
            ["inputs"] => out.push("input 0-15: 0000000000000000".to_string()),
            ["gpio"] => {
                out.push("=== GPIO MAPPING ===".to_string());
                if self.heartbeat_gpio {
                    out.push("GPIO 2: HEARTBEAT".to_string());
                }
                for (pin, target) in &self.gpio_map {
                    out.push(format!("GPIO {pin}: {target} (static)"));
                }
            }
            ["echo"] => out.push(format!("echo: {}", if self.profile.echo { "on" } else { "off" })),
            ["reg"] => {
                out.push(format!("reg static: {} entries", self.registers.len()));
                for (addr, src) in &self.dynamic_regs {
                    out.push(format!("reg {addr}: DYNAMIC {src:?}"));
                }
            }
            ["coil"] => {
                out.push(format!("coil static: {} entries", self.coils.len()));
                for (addr, src) in &self.dynamic_coils {
                    out.push(format!("coil {addr}: DYNAMIC {src:?}"));
                }
            }
            _ => return false,
        }
        true
    }

    fn help(&self, out: &mut Vec<String>) {
        out.push("Commands:".to_string());
        for line in [
            "  show config|version|counters|timers|registers|coils|inputs|gpio|echo|reg|coil",
            "  read reg|coil <addr> <count>",
            "  write reg <addr> value <int> / write coil <addr> value <on|off>",
            "  set counter|timer|reg|coil|gpio|id ...",
            "  save / load",
        ] {
            out.push(line.to_string());
        }
    }
}
