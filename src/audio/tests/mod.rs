mod format;
mod queue;
