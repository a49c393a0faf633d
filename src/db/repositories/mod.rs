mod sessions;
mod trace_points;
