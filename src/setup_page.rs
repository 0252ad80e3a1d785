//! The embedded configuration page served by the portal.

/// Single-page WiFi setup form.
///
/// Populates the SSID list from `./api/WiFiList`, shows the device name and
/// MAC from `./api/info`, and submits a JSON body to `./api/WiFiSetting`.
/// A retryable error response keeps the page usable for another attempt.
pub(crate) const SETUP_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>WiFi Setup</title>
<style>
    body { font-family: Arial, sans-serif; background-color: #f5f5f5; margin: 0; padding: 0; }
    h1 { text-align: center; margin-top: 20px; }
    form { width: 80%; max-width: 400px; margin: 0 auto; background-color: #fff; padding: 20px;
           border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
    label { display: block; margin-bottom: 5px; text-align: left; }
    input, select { width: 100%; padding: 8px; margin-bottom: 10px; border: 1px solid #ccc;
                    border-radius: 4px; box-sizing: border-box; }
    .hidden { display: none; }
    button { width: 100%; padding: 10px; border: none; border-radius: 4px; cursor: pointer;
             font-weight: bold; margin-bottom: 10px; }
    .btn-primary { background-color: #4CAF50; color: white; }
    .btn-secondary { background-color: white; color: #4CAF50; border: 2px solid #4CAF50; }
    #status { text-align: center; font-weight: bold; margin-top: 20px; }
    #status.error { color: #d32f2f; }
    #deviceInfo { text-align: center; margin-top: 20px; color: #666; }
</style>
</head>
<body>
<h1 id="title">WiFi Setup</h1>
<form id="wifiForm">
    <label for="ssid">Network (SSID):</label>
    <select id="ssid" onchange="toggleOtherSsid()"></select>
    <input type="text" id="otherSsid" class="hidden" placeholder="SSID">
    <label for="password">Password:</label>
    <input type="password" id="password" required>
    <div id="staticForm" class="hidden">
        <label for="staticIP">IP address:</label>
        <input type="text" id="staticIP" value="192.168.1.200">
        <label for="gateway">Gateway:</label>
        <input type="text" id="gateway" value="192.168.1.1">
        <label for="subnet">Subnet mask:</label>
        <input type="text" id="subnet" value="255.255.255.0">
        <label for="primaryDNS">Primary DNS:</label>
        <input type="text" id="primaryDNS" value="8.8.8.8">
        <label for="secondaryDNS">Secondary DNS:</label>
        <input type="text" id="secondaryDNS" value="8.8.4.4">
    </div>
    <button type="button" id="staticToggle" class="btn-secondary" onclick="toggleStatic()">Static IP</button>
    <button type="submit" class="btn-primary">Save and connect</button>
</form>
<div id="status"></div>
<div id="deviceInfo"></div>
<script>
    var useStaticIP = false;

    function toggleStatic() {
        useStaticIP = !useStaticIP;
        document.getElementById('staticForm').classList.toggle('hidden', !useStaticIP);
        var button = document.getElementById('staticToggle');
        button.textContent = useStaticIP ? 'Static IP (on)' : 'Static IP';
        button.className = useStaticIP ? 'btn-primary' : 'btn-secondary';
    }

    function toggleOtherSsid() {
        var other = document.getElementById('otherSsid');
        other.classList.toggle('hidden', document.getElementById('ssid').value !== '(other)');
    }

    function selectedSsid() {
        var value = document.getElementById('ssid').value;
        return value === '(other)' ? document.getElementById('otherSsid').value : value;
    }

    document.getElementById('wifiForm').addEventListener('submit', function (event) {
        event.preventDefault();
        var data = {
            ssid: selectedSsid(),
            password: document.getElementById('password').value,
            useStaticIP: useStaticIP
        };
        if (useStaticIP) {
            ['staticIP', 'gateway', 'subnet', 'primaryDNS', 'secondaryDNS'].forEach(function (key) {
                data[key] = document.getElementById(key).value;
            });
        }
        var status = document.getElementById('status');
        status.textContent = 'Saving and connecting...';
        status.className = '';
        fetch('./api/WiFiSetting', {
            method: 'POST',
            headers: { 'Content-Type': 'application/json' },
            body: JSON.stringify(data)
        }).then(function (response) { return response.json(); }).then(function (reply) {
            status.textContent = reply.message || 'Done';
            status.className = reply.status === 'error' ? 'error' : '';
        }).catch(function () {
            status.textContent = 'No response from device';
            status.className = 'error';
        });
    });

    window.onload = function () {
        fetch('./api/WiFiList').then(function (r) { return r.json(); }).then(function (data) {
            var select = document.getElementById('ssid');
            (data.networks || []).forEach(function (network) {
                var option = document.createElement('option');
                option.value = network;
                option.textContent = network;
                select.appendChild(option);
            });
            var other = document.createElement('option');
            other.value = '(other)';
            other.textContent = 'Other...';
            select.appendChild(other);
            toggleOtherSsid();
        });
        fetch('./api/info').then(function (r) { return r.json(); }).then(function (data) {
            document.getElementById('title').textContent = data.DeviceName + ' WiFi Setup';
            document.title = data.DeviceName + ' WiFi Setup';
            document.getElementById('deviceInfo').textContent = 'MAC: ' + data.MAC;
        });
    };
</script>
</body>
</html>
"#;
