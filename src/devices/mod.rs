//! Device library.
//!
//! Every device class known to a fresh [`Factory`] is registered here
//! together with its default parameter list. The list names the positional
//! parameters of a netlist statement (`RES(R1, 1k)` sets `R1.R`); a leading
//! `+` marks the positional values as pin names instead.

pub mod proxy;
pub mod system;
pub mod truthtable;
pub mod twoterm;

use crate::error::Result;
use crate::setup::Factory;
use crate::solver::SolverDevice;

/// Register all built-in device classes.
pub fn register_all(f: &mut Factory) -> Result<()> {
    // analog
    f.register("RES", "R", twoterm::Resistor::build);
    f.register("CAP", "C", twoterm::Capacitor::build);
    f.register("DIODE", "MODEL", twoterm::Diode::build);
    f.register("VS", "V", twoterm::VoltageSource::build);
    f.register("CS", "I", twoterm::CurrentSource::build);
    f.register("SWITCH", "-", twoterm::Switch::build);
    f.register("RES_SWITCH", "+IN,P1,P2", twoterm::ResSwitch::build);

    // system
    f.register("GND", "-", system::Gnd::build);
    f.register("TTL_INPUT", "IN", system::LogicInput::build_ttl);
    f.register("LOGIC_INPUT", "IN,FAMILY", system::LogicInput::build);
    f.register("ANALOG_INPUT", "IN", system::AnalogInput::build);
    f.register("CLOCK", "FREQ", system::Clock::build);
    f.register("MAINCLOCK", "FREQ", system::MainClock::build);
    f.register("DUMMY_INPUT", "-", system::DummyInput::build);
    f.register("FRONTIER_DEV", "+I,G,Q", system::Frontier::build);
    f.register("LOG", "+I", system::Log::build);
    f.register("SOLVER", "FREQ", SolverDevice::build);

    // inserted by the resolver
    f.register(proxy::D_TO_A_CLASS, "-", proxy::DToAProxy::build);
    f.register(proxy::A_TO_D_CLASS, "-", proxy::AToDProxy::build);

    truthtable::register_library(f)
}
